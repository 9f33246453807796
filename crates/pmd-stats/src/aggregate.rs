use std::{collections::HashSet, fmt, str::FromStr};

use crate::StatsError;

/// Aggregation kind of a key, fixed by its first sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Gauge,
    Counter,
    Timer,
    Set,
    KeyValue,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Gauge => "g",
            Kind::Counter => "c",
            Kind::Timer => "ms",
            Kind::Set => "s",
            Kind::KeyValue => "kv",
        }
    }
}

impl FromStr for Kind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "g" => Ok(Kind::Gauge),
            "c" => Ok(Kind::Counter),
            "ms" => Ok(Kind::Timer),
            "s" => Ok(Kind::Set),
            "kv" => Ok(Kind::KeyValue),
            other => Err(StatsError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-key aggregation state.
#[derive(Debug, Clone)]
pub(crate) enum Aggregate {
    Gauge(f64),
    Counter(f64),
    Timer { sum: f64, count: u64 },
    Set(HashSet<String>),
    KeyValue(f64),
}

impl Aggregate {
    pub(crate) fn new(kind: Kind) -> Self {
        match kind {
            Kind::Gauge => Aggregate::Gauge(0.0),
            Kind::Counter => Aggregate::Counter(0.0),
            Kind::Timer => Aggregate::Timer { sum: 0.0, count: 0 },
            Kind::Set => Aggregate::Set(HashSet::new()),
            Kind::KeyValue => Aggregate::KeyValue(0.0),
        }
    }

    pub(crate) fn kind(&self) -> Kind {
        match self {
            Aggregate::Gauge(_) => Kind::Gauge,
            Aggregate::Counter(_) => Kind::Counter,
            Aggregate::Timer { .. } => Kind::Timer,
            Aggregate::Set(_) => Kind::Set,
            Aggregate::KeyValue(_) => Kind::KeyValue,
        }
    }

    /// Folds one raw sample value in. `rate` only scales counters.
    pub(crate) fn feed(&mut self, key: &str, raw: &str, rate: f64) -> Result<(), StatsError> {
        let invalid = || StatsError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        };

        match self {
            Aggregate::Set(seen) => {
                seen.insert(raw.to_string());
            }
            Aggregate::Gauge(current) => {
                let v: f64 = raw.parse().map_err(|_| invalid())?;
                if raw.starts_with('+') || raw.starts_with('-') {
                    *current += v;
                } else {
                    *current = v;
                }
            }
            Aggregate::Counter(sum) => {
                let v: f64 = raw.parse().map_err(|_| invalid())?;
                *sum += v / rate;
            }
            Aggregate::Timer { sum, count } => {
                let v: f64 = raw.parse().map_err(|_| invalid())?;
                *sum += v;
                *count += 1;
            }
            Aggregate::KeyValue(last) => {
                *last = raw.parse().map_err(|_| invalid())?;
            }
        }
        Ok(())
    }

    /// Reports the value for this flush and applies the kind's reset policy.
    pub(crate) fn take(&mut self) -> f64 {
        match self {
            Aggregate::Gauge(v) => *v,
            Aggregate::Counter(sum) => std::mem::take(sum),
            Aggregate::KeyValue(last) => std::mem::take(last),
            Aggregate::Set(seen) => {
                let n = seen.len() as f64;
                seen.clear();
                n
            }
            Aggregate::Timer { sum, count } => {
                let mean = if *count == 0 { 0.0 } else { *sum / *count as f64 };
                *sum = 0.0;
                *count = 0;
                mean
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fed(kind: Kind, values: &[&str]) -> Aggregate {
        let mut agg = Aggregate::new(kind);
        for v in values {
            agg.feed("k", v, 1.0).unwrap();
        }
        agg
    }

    #[test]
    fn gauge_deltas_and_set() {
        let mut g = fed(Kind::Gauge, &["+1", "+4", "-2"]);
        assert_eq!(g.take(), 3.0);
        // kept across flushes
        assert_eq!(g.take(), 3.0);

        g.feed("k", "10", 1.0).unwrap();
        assert_eq!(g.take(), 10.0);
    }

    #[test]
    fn counter_resets() {
        let mut c = fed(Kind::Counter, &["1", "2", "3"]);
        assert_eq!(c.take(), 6.0);
        assert_eq!(c.take(), 0.0);
    }

    #[test]
    fn counter_sample_rate() {
        let mut c = Aggregate::new(Kind::Counter);
        c.feed("k", "1", 0.5).unwrap();
        assert_eq!(c.take(), 2.0);
    }

    #[test]
    fn timer_mean() {
        let mut t = fed(Kind::Timer, &["10", "20", "60"]);
        assert_eq!(t.take(), 30.0);
        assert_eq!(t.take(), 0.0);
    }

    #[test]
    fn set_counts_distinct() {
        let mut s = fed(Kind::Set, &["a", "b", "a", "c"]);
        assert_eq!(s.take(), 3.0);
        assert_eq!(s.take(), 0.0);
    }

    #[test]
    fn key_value_keeps_last() {
        let mut kv = fed(Kind::KeyValue, &["5", "7"]);
        assert_eq!(kv.take(), 7.0);
        assert_eq!(kv.take(), 0.0);
    }

    #[test]
    fn rejects_non_numeric() {
        let mut g = Aggregate::new(Kind::Gauge);
        assert!(matches!(
            g.feed("k", "abc", 1.0),
            Err(StatsError::InvalidValue { .. })
        ));
    }
}
