use serde::{Deserialize, Serialize};

use crate::Command;

/// Symbolic boot priorities an entry may declare in its `after` list.
///
/// Priorities are weights on one axis: an entry after `net` runs in the networking cohort,
/// an entry with no `after` list runs with the rest of the boot services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum After {
    Init,
    Net,
    Boot,
}

impl After {
    /// Sentinel upper bound meaning "to the end of the run order".
    pub const END: i64 = -1;

    pub fn weight(self) -> i64 {
        match self {
            After::Init => 1,
            After::Net => 1_000,
            After::Boot => 1_000_000,
        }
    }

    pub fn parse(tag: &str) -> Option<After> {
        match tag {
            "init" => Some(After::Init),
            "net" => Some(After::Net),
            "boot" => Some(After::Boot),
            _ => None,
        }
    }
}

/// One entry of a boot batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Startup {
    /// Key other entries depend on; also the job id.
    #[serde(default)]
    pub key: String,
    /// Process factory key.
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
    /// Priority tags (`init`, `net`, `boot`) or keys of other entries.
    #[serde(default)]
    pub after: Vec<String>,
    /// Seconds after which a running daemon counts as up.
    ///
    /// `0` uses the default settle delay, a negative value waits for the process to exit.
    #[serde(default)]
    pub running_delay: i64,
    /// Regex on the output marking a running daemon as up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_match: Option<String>,
    #[serde(default)]
    pub max_restart: u32,
    #[serde(default)]
    pub recurring_period: u64,
}

impl Startup {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the job submitted for this entry.
    pub fn to_command(&self) -> Command {
        Command::new(self.name.clone())
            .with_id(self.key.clone())
            .with_arguments(self.args.clone())
            .with_max_restart(self.max_restart)
            .with_recurring_period(self.recurring_period)
    }
}
