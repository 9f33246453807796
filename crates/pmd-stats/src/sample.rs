use std::str::FromStr;

use crate::{Kind, StatsError};

/// One parsed `key:value|type[|@rate]` line.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: String,
    pub value: String,
    pub kind: Kind,
    pub rate: f64,
}

impl FromStr for Sample {
    type Err = StatsError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let malformed = || StatsError::Malformed(line.to_string());

        let (key, rest) = line.split_once(':').ok_or_else(malformed)?;
        let mut parts = rest.split('|');
        let value = parts.next().ok_or_else(malformed)?;
        let kind = parts.next().ok_or_else(malformed)?.parse::<Kind>()?;

        let rate = match parts.next() {
            Some(flag) => flag
                .strip_prefix('@')
                .and_then(|r| r.parse::<f64>().ok())
                .filter(|r| *r > 0.0)
                .ok_or_else(malformed)?,
            None => 1.0,
        };

        if key.is_empty() || value.is_empty() {
            return Err(malformed());
        }

        Ok(Sample {
            key: key.to_string(),
            value: value.to_string(),
            kind,
            rate,
        })
    }
}
