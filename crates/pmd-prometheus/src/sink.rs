use std::sync::Arc;

use prometheus::{GaugeVec, Opts, Registry, proto::MetricFamily};
use tracing::trace;

use pmd_core::{Snapshot, StatsFlushHandler};

use crate::PrometheusError;

/// Gauge export of flushed job statistics.
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,
    stats: GaugeVec,
}

impl PrometheusSink {
    /// Sink with a private registry.
    pub fn new() -> Result<Self, PrometheusError> {
        Self::with_registry(Registry::new())
    }

    /// Sink registering its metrics in `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self, PrometheusError> {
        let stats = GaugeVec::new(
            Opts::new("pmd_job_stat", "Last flushed value of a job statistic"),
            &["job", "key"],
        )?;
        registry.register(Box::new(stats.clone()))?;
        Ok(Self { registry, stats })
    }

    pub fn record(&self, snapshot: &Snapshot) {
        let job = snapshot.prefix.as_str();
        for (key, value) in snapshot.keys() {
            self.stats.with_label_values(&[job, key]).set(value);
        }
        trace!(target: "pmd.prometheus", series = snapshot.series.len(), "snapshot recorded");
    }

    /// Flush handler feeding this sink.
    pub fn handler(&self) -> StatsFlushHandler {
        let sink = self.clone();
        Arc::new(move |snapshot: &Snapshot| sink.record(snapshot))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}
