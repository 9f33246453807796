//! Prometheus export of job statistics.
//!
//! [`PrometheusSink`] is a stats-flush handler for the process manager: every flushed
//! snapshot is written into a gauge vector of its own [`Registry`].
//!
//! ## Example
//! ```rust,ignore
//! let sink = PrometheusSink::new()?;
//! pm.add_stats_flush_handler(sink.handler());
//!
//! // later, in your own HTTP handler
//! let encoder = prometheus::TextEncoder::new();
//! let body = encoder.encode_to_string(&sink.gather())?;
//! ```
//!
//! ## Metrics
//! - `pmd_job_stat{job, key}` - Gauge, last flushed value of each series.
//!   A series `redis._rss_` is exported as `{job="redis", key="_rss_"}`.
//!
//! ## HTTP Server
//! This crate does NOT serve `/metrics`; expose [`PrometheusSink::gather`] with the
//! HTTP stack of the embedding application.
mod error;
pub use error::PrometheusError;

mod sink;
pub use sink::PrometheusSink;

pub use prometheus::{Encoder, Registry, TextEncoder};
