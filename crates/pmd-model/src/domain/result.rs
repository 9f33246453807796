use serde::{Deserialize, Serialize};

use crate::{Command, JobState, Level};

/// Terminal snapshot of one runner.
///
/// Built once per terminal transition and never mutated after delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: String,
    pub command: String,
    /// Payload of the last structured result message.
    pub data: String,
    /// Level of `data`; 0 when no result message was seen.
    pub level: Level,
    /// Tails of stdout and stderr.
    pub streams: [String; 2],
    /// Last critical-level message.
    pub critical: String,
    pub state: JobState,
    /// Unix milliseconds.
    pub start_time: i64,
    /// Run duration in milliseconds.
    pub time: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
}

impl JobResult {
    /// Result with no output, used for admission errors and as the runner's starting point.
    pub fn new(cmd: &Command, state: JobState) -> Self {
        Self {
            id: cmd.id.clone(),
            command: cmd.command.clone(),
            data: String::new(),
            level: Level(0),
            streams: [String::new(), String::new()],
            critical: String::new(),
            state,
            start_time: 0,
            time: 0,
            tags: cmd.tags.clone(),
        }
    }
}
