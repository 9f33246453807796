use std::fmt;

use serde::{Deserialize, Serialize};

/// Output level of a [`Message`](crate::Message).
///
/// Levels are plain numbers on the wire (`N::content`); the named constants cover the reserved bands:
/// - `1..=11`  regular output (stdout, stderr, warnings, statsd samples, ...)
/// - `20..=30` structured result payloads
/// - `50`      exit-state sentinel
/// - `100+`    internal control messages, never forwarded to sinks
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub u16);

impl Level {
    pub const STDOUT: Level = Level(1);
    pub const STDERR: Level = Level(2);
    pub const PUBLIC: Level = Level(3);
    pub const OPERATOR: Level = Level(4);
    pub const UNKNOWN: Level = Level(5);
    pub const STRUCTURED: Level = Level(6);
    pub const WARNING: Level = Level(7);
    pub const OPS_ERROR: Level = Level(8);
    pub const CRITICAL: Level = Level(9);
    pub const STATSD: Level = Level(10);
    pub const DEBUG: Level = Level(11);

    pub const RESULT_JSON: Level = Level(20);
    pub const RESULT_YAML: Level = Level(21);
    pub const RESULT_TOML: Level = Level(22);
    pub const RESULT_HRD: Level = Level(23);
    pub const RESULT_JOB: Level = Level(30);

    pub const EXIT_STATE: Level = Level(50);

    pub const INTERNAL: Level = Level(100);
    pub const INTERNAL_MONITOR_PID: Level = Level(101);

    /// Returns `true` for the structured result formats.
    pub fn is_result(self) -> bool {
        matches!(
            self,
            Level::RESULT_JSON
                | Level::RESULT_YAML
                | Level::RESULT_TOML
                | Level::RESULT_HRD
                | Level::RESULT_JOB
        )
    }

    /// Returns `true` for control messages handled by the process itself.
    pub fn is_internal(self) -> bool {
        self.0 >= Level::INTERNAL.0
    }
}

impl From<u16> for Level {
    fn from(v: u16) -> Self {
        Level(v)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
