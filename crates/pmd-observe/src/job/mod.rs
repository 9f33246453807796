//! Console rendering of job output and results.
//!
//! Job output levels map onto tracing levels under the `pmd.job` target:
//!
//! | job level                              | tracing |
//! |----------------------------------------|---------|
//! | stdout, public, unknown, structured    | INFO    |
//! | stderr, warning                        | WARN    |
//! | operator, ops error, critical          | ERROR   |
//! | debug                                  | DEBUG   |
//! | statsd, results, exit state, internal  | TRACE   |
use pmd_model::{Command, JobResult, JobState, Level, Message};
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "subscriber")]
mod console;
#[cfg(feature = "subscriber")]
pub use console::Console;

#[inline]
pub fn level_for(level: Level) -> tracing::Level {
    match level {
        Level::STDOUT | Level::PUBLIC | Level::UNKNOWN | Level::STRUCTURED => tracing::Level::INFO,
        Level::STDERR | Level::WARNING => tracing::Level::WARN,
        Level::OPERATOR | Level::OPS_ERROR | Level::CRITICAL => tracing::Level::ERROR,
        Level::DEBUG => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

#[inline]
pub fn message_for(state: JobState) -> &'static str {
    match state {
        JobState::Success => "job succeeded",
        JobState::Error => "job failed",
        JobState::Timeout => "job exceeded its max time",
        JobState::Killed => "job killed",
        JobState::UnknownCommand => "job rejected: unknown command type",
        JobState::DuplicateId => "job rejected: id already running",
    }
}

pub fn log_message(cmd: &Command, msg: &Message) {
    let (id, level, line) = (cmd.id.as_str(), msg.level.0, msg.content.as_str());
    match level_for(msg.level) {
        tracing::Level::INFO => info!(target: "pmd.job", id, level, "{line}"),
        tracing::Level::WARN => warn!(target: "pmd.job", id, level, "{line}"),
        tracing::Level::ERROR => error!(target: "pmd.job", id, level, "{line}"),
        tracing::Level::DEBUG => debug!(target: "pmd.job", id, level, "{line}"),
        _ => trace!(target: "pmd.job", id, level, "{line}"),
    }
}

pub fn log_result(cmd: &Command, res: &JobResult) {
    let msg = message_for(res.state);
    let (id, command, time_ms) = (cmd.id.as_str(), cmd.command.as_str(), res.time);

    match res.state {
        JobState::Success | JobState::Killed => info!(target: "pmd.job", id, command, time_ms, "{msg}"),
        JobState::Timeout => warn!(target: "pmd.job", id, command, time_ms, "{msg}"),
        JobState::UnknownCommand | JobState::DuplicateId => warn!(target: "pmd.job", id, command, "{msg}"),
        JobState::Error if res.critical.is_empty() => {
            error!(target: "pmd.job", id, command, time_ms, "{msg}")
        }
        JobState::Error => {
            error!(target: "pmd.job", id, command, time_ms, critical = %res.critical, "{msg}")
        }
    }
}
