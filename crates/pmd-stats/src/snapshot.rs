use serde::{Deserialize, Serialize};

/// Immutable result of one flush.
///
/// `timestamp` is Unix seconds truncated to the flush interval; `series` is ordered by key
/// and every key starts with `prefix.`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub prefix: String,
    pub timestamp: i64,
    pub series: Vec<(String, f64)>,
}

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.series
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// Series with the `prefix.` part stripped from their keys.
    pub fn keys(&self) -> impl Iterator<Item = (&str, f64)> {
        self.series.iter().map(|(k, v)| {
            let key = k
                .strip_prefix(self.prefix.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(k.as_str());
            (key, *v)
        })
    }
}
