use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Terminal state of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// The process reported success.
    Success,
    /// Abnormal exit, explicit error state or spawn failure.
    Error,
    /// The run exceeded `max_time`.
    Timeout,
    /// Operator requested termination.
    Killed,
    /// No process factory is registered for the command type.
    UnknownCommand,
    /// A job with the same id is already running.
    DuplicateId,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Success => "SUCCESS",
            JobState::Error => "ERROR",
            JobState::Timeout => "TIMEOUT",
            JobState::Killed => "KILLED",
            JobState::UnknownCommand => "UNKNOWN_COMMAND",
            JobState::DuplicateId => "DUPLICATE_ID",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Success)
    }
}

impl FromStr for JobState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SUCCESS" => Ok(JobState::Success),
            "ERROR" => Ok(JobState::Error),
            "TIMEOUT" => Ok(JobState::Timeout),
            "KILLED" => Ok(JobState::Killed),
            "UNKNOWN_COMMAND" => Ok(JobState::UnknownCommand),
            "DUPLICATE_ID" => Ok(JobState::DuplicateId),
            other => Err(ModelError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names() {
        for state in [
            JobState::Success,
            JobState::Error,
            JobState::Timeout,
            JobState::Killed,
            JobState::UnknownCommand,
            JobState::DuplicateId,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{}\"", state.as_str())
            );
        }
    }

    #[test]
    fn rejects_unknown() {
        assert!(matches!(
            "DONE".parse::<JobState>(),
            Err(ModelError::UnknownState(s)) if s == "DONE"
        ));
    }
}
