//! Process manager runtime.
//!
//! ```text
//!  push_cmd ──────────────┐
//!                         ▼
//!  push_cmd_to_queue ─► QueueManager ─► admission (max_jobs) ─► Runner ─► Process
//!                         ▲                                        │
//!                         └──────────── notify on finish ──────────┘
//! ```
//!
//! - [`ProcessManager`] owns the runner registry, the factory registry and the callbacks.
//! - A [`Runner`](runner) supervises one command across restarts and yields exactly one `JobResult`.
//! - [`PidRegistry`] pairs every spawn with the single process-wide SIGCHLD reaper.
//! - [`StateMachine`] and [`StartupTree`] order and gate a boot batch.
pub mod boot;
pub use boot::{BootError, StartupTree, StateMachine};

mod config;
pub use config::PmConfig;

mod error;
pub use error::CoreError;

pub mod hook;
pub use hook::{DelayHook, ExitHook, MatchHook, PidHook, RunnerHook};

mod manager;
pub use manager::{MessageHandler, ProcessManager, ResultHandler};

pub mod pid;
pub use pid::{ExitStatus, Pid, PidError, PidRegistry, PidTable};

mod process;
pub use process::{MessageRx, Process, ProcessFactory};

mod queue;

mod runner;
pub use runner::RunnerHandle;

pub mod stream;

#[cfg(test)]
mod testing;

pub use pmd_stats::{FlushHandler as StatsFlushHandler, Snapshot};
