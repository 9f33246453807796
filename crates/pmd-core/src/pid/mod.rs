//! PID table and the process-wide reaper.
//!
//! ```text
//!   register(spawn) ── lock ──► spawn() ──► insert pid ──► unlock
//!                       │
//!   SIGCHLD ─► reaper ── lock ──► waitpid(-1, WNOHANG)* ──► send status ──► wait_pid(pid)
//! ```
//!
//! ## Rules
//! - `spawn` runs under the table lock and the reaper collects under the same lock,
//!   so no status can be collected before its entry exists.
//! - The reaper drains every ready child per wakeup; coalesced signals lose nothing.
//! - Statuses of untracked pids are dropped.
//! - Nothing else in the process may collect child statuses.
use std::io;

use async_trait::async_trait;
use nix::sys::wait::WaitStatus;
use thiserror::Error;

mod reaper;
mod registry;
pub use registry::PidRegistry;

pub type Pid = i32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PidError {
    #[error("pid {0} is not registered or already awaited")]
    NotRegistered(Pid),
    #[error("exit status of pid {0} was lost")]
    Lost(Pid),
}

/// Atomic spawn/reap coordination.
#[async_trait]
pub trait PidTable: Send + Sync {
    /// Runs `spawn` under the table lock and registers the pid it returns.
    ///
    /// A failing `spawn` leaves no entry behind.
    fn register(&self, spawn: &mut dyn FnMut() -> io::Result<Pid>) -> io::Result<Pid>;

    /// Waits for the exit status of a registered pid. Each pid can be awaited once.
    async fn wait_pid(&self, pid: Pid) -> Result<ExitStatus, PidError>;
}

/// Decoded wait status of a child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitStatus {
    pub pid: Pid,
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Terminal statuses only; stop, continue and ptrace reports yield `None`.
    pub fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(pid, code) => Some(Self {
                pid: pid.as_raw(),
                code: Some(code),
                signal: None,
            }),
            WaitStatus::Signaled(pid, signal, _) => Some(Self {
                pid: pid.as_raw(),
                code: None,
                signal: Some(signal as i32),
            }),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::{sys::signal::Signal, unistd::Pid as RawPid};

    fn pid() -> RawPid {
        RawPid::from_raw(10)
    }

    #[test]
    fn decodes_exit_code() {
        let st = ExitStatus::from_wait(WaitStatus::Exited(pid(), 3)).unwrap();
        assert_eq!((st.pid, st.code, st.signal), (10, Some(3), None));
        assert!(!st.success());
        assert!(ExitStatus::from_wait(WaitStatus::Exited(pid(), 0)).unwrap().success());
    }

    #[test]
    fn decodes_signal() {
        let st = ExitStatus::from_wait(WaitStatus::Signaled(pid(), Signal::SIGKILL, false)).unwrap();
        assert_eq!(st.code, None);
        assert_eq!(st.signal, Some(Signal::SIGKILL as i32));
    }

    #[test]
    fn stops_are_not_exits() {
        assert_eq!(ExitStatus::from_wait(WaitStatus::Stopped(pid(), Signal::SIGSTOP)), None);
        assert_eq!(ExitStatus::from_wait(WaitStatus::Continued(pid())), None);
        assert_eq!(ExitStatus::from_wait(WaitStatus::StillAlive), None);
    }
}
