use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{JobState, Level};

/// One leveled unit of process output.
///
/// `epoch` is stamped by the runner on receipt (Unix nanoseconds) and stays 0 until then.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub content: String,
    pub epoch: i64,
}

impl Message {
    pub fn new(level: Level, content: impl Into<String>) -> Self {
        Self {
            level,
            content: content.into(),
            epoch: 0,
        }
    }

    /// Exit-state sentinel emitted by a process variant when its run is over.
    pub fn exit(state: JobState) -> Self {
        Self::new(Level::EXIT_STATE, state.as_str())
    }

    /// Stamps the current wall-clock time.
    pub fn stamp(&mut self) {
        self.epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default();
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.level, self.content)
    }
}

#[derive(Serialize)]
struct WireOut<'a> {
    epoch: i64,
    level: Level,
    data: &'a str,
}

#[derive(Deserialize)]
struct WireIn {
    #[serde(default)]
    epoch: i64,
    level: Level,
    #[serde(default)]
    data: String,
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        WireOut {
            epoch: self.epoch / 1_000_000,
            level: self.level,
            data: &self.content,
        }
        .serialize(s)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let wire = WireIn::deserialize(d)?;
        Ok(Message {
            level: wire.level,
            content: wire.data,
            epoch: wire.epoch * 1_000_000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_uses_milliseconds() {
        let msg = Message {
            level: Level::STDOUT,
            content: "hello".into(),
            epoch: 1_500_000_000,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"epoch": 1500, "level": 1, "data": "hello"})
        );
    }

    #[test]
    fn exit_message_carries_state() {
        let msg = Message::exit(JobState::Timeout);
        assert_eq!(msg.level, Level::EXIT_STATE);
        assert_eq!(msg.content, "TIMEOUT");
        assert_eq!(msg.to_string(), "50|TIMEOUT");
    }

    #[test]
    fn stamp_sets_epoch() {
        let mut msg = Message::new(Level::STDERR, "x");
        assert_eq!(msg.epoch, 0);
        msg.stamp();
        assert!(msg.epoch > 0);
    }
}
