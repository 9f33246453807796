use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{Sample, Snapshot, StatsError, aggregate::Aggregate};

/// Synchronous aggregation buffer keyed by sample key.
#[derive(Debug)]
pub struct Aggregator {
    prefix: String,
    interval: Duration,
    buffers: BTreeMap<String, Aggregate>,
}

impl Aggregator {
    pub fn new(prefix: impl Into<String>, interval: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            interval: interval.max(Duration::from_secs(1)),
            buffers: BTreeMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Parses and records one sample line.
    pub fn feed(&mut self, line: &str) -> Result<(), StatsError> {
        let sample: Sample = line.parse()?;
        self.record(&sample)
    }

    /// Records an already parsed sample.
    ///
    /// A key keeps the kind of its first valid sample; a later sample of another kind is rejected.
    pub fn record(&mut self, sample: &Sample) -> Result<(), StatsError> {
        let Some(agg) = self.buffers.get_mut(&sample.key) else {
            let mut agg = Aggregate::new(sample.kind);
            agg.feed(&sample.key, &sample.value, sample.rate)?;
            self.buffers.insert(sample.key.clone(), agg);
            return Ok(());
        };

        if agg.kind() != sample.kind {
            return Err(StatsError::Inconsistent {
                key: sample.key.clone(),
                existing: agg.kind(),
                got: sample.kind,
            });
        }
        agg.feed(&sample.key, &sample.value, sample.rate)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Emits a snapshot of every key and resets them per kind. Returns `None` when nothing was recorded.
    pub fn flush(&mut self, now: SystemTime) -> Option<Snapshot> {
        if self.buffers.is_empty() {
            return None;
        }

        let secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let step = self.interval.as_secs().max(1);

        let series = self
            .buffers
            .iter_mut()
            .map(|(key, agg)| (format!("{}.{}", self.prefix, key), agg.take()))
            .collect();

        Some(Snapshot {
            prefix: self.prefix.clone(),
            timestamp: ((secs / step) * step) as i64,
            series,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn empty_is_not_flushed() {
        let mut agg = Aggregator::new("job", Duration::from_secs(30));
        assert!(agg.flush(at(100)).is_none());
    }

    #[test]
    fn gauge_sums_deltas() {
        let mut agg = Aggregator::new("job", Duration::from_secs(30));
        for line in ["k:+1|g", "k:+4|g", "k:-2|g"] {
            agg.feed(line).unwrap();
        }
        let snap = agg.flush(at(100)).unwrap();
        assert_eq!(snap.get("job.k"), Some(3.0));
    }

    #[test]
    fn counter_resets_after_flush() {
        let mut agg = Aggregator::new("job", Duration::from_secs(30));
        for line in ["k:1|c", "k:4|c"] {
            agg.feed(line).unwrap();
        }
        assert_eq!(agg.flush(at(100)).unwrap().get("job.k"), Some(5.0));
        assert_eq!(agg.flush(at(130)).unwrap().get("job.k"), Some(0.0));
    }

    #[test]
    fn timestamp_is_truncated_to_interval() {
        let mut agg = Aggregator::new("job", Duration::from_secs(30));
        agg.feed("k:1|kv").unwrap();
        assert_eq!(agg.flush(at(119)).unwrap().timestamp, 90);
    }

    #[test]
    fn series_ordered_by_key() {
        let mut agg = Aggregator::new("p", Duration::from_secs(10));
        for line in ["b:1|c", "a:1|c", "c:1|c"] {
            agg.feed(line).unwrap();
        }
        let keys: Vec<_> = agg
            .flush(at(0))
            .unwrap()
            .series
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["p.a", "p.b", "p.c"]);
    }

    #[test]
    fn invalid_first_sample_leaves_no_series() {
        let mut agg = Aggregator::new("job", Duration::from_secs(30));
        let err = agg.feed("k:abc|g").unwrap_err();
        assert!(matches!(err, StatsError::InvalidValue { ref key, .. } if key == "k"));
        assert!(agg.is_empty());
        assert!(agg.flush(at(0)).is_none());

        // the key is still free to take another kind
        agg.feed("k:2|c").unwrap();
        assert_eq!(agg.flush(at(0)).unwrap().get("job.k"), Some(2.0));
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let mut agg = Aggregator::new("job", Duration::from_secs(30));
        agg.feed("k:1|c").unwrap();

        let err = agg.feed("k:1|g").unwrap_err();
        assert!(matches!(err, StatsError::Inconsistent { ref key, .. } if key == "k"));

        // the existing counter keeps its value
        agg.feed("k:2|c").unwrap();
        assert_eq!(agg.flush(at(0)).unwrap().get("job.k"), Some(3.0));
    }
}
