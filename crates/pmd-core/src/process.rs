use std::sync::Arc;

use tokio::sync::mpsc;

use pmd_model::{Command, Message, ProcessStats};

use crate::{CoreError, PidTable};

/// Messages produced by one process run. The channel closes when the run is over.
pub type MessageRx = mpsc::Receiver<Message>;

/// One spawn attempt of a command.
///
/// Instances are single use: the runner asks the factory for a fresh one on every restart.
/// Variants that reach a terminal state on their own finish their stream with an
/// [`EXIT_STATE`](pmd_model::Level::EXIT_STATE) message before closing the channel.
pub trait Process: Send {
    /// Starts execution and returns the message stream.
    fn run(&mut self) -> Result<MessageRx, CoreError>;

    /// Requests termination. Must not block; calling it on a finished process is a no-op.
    fn kill(&mut self);

    /// Current resource usage.
    fn stats(&mut self) -> ProcessStats;
}

/// Builds a process for a command. OS-backed variants spawn through the given table.
pub type ProcessFactory =
    Arc<dyn Fn(Arc<dyn PidTable>, Arc<Command>) -> Box<dyn Process> + Send + Sync>;
