//! In-process commands.
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pmd_core::{CoreError, MessageRx, PidTable, Process, ProcessFactory};
use pmd_model::{Command, JobState, Level, Message, ProcessStats};

use crate::error::ExecResult;

/// Body of a builtin command. Runs on the blocking pool.
pub type Runnable = Arc<dyn Fn(&Command) -> ExecResult<Value> + Send + Sync>;

/// Runs a [`Runnable`] and reports its return value as a `RESULT_JSON` message.
///
/// A builtin cannot be interrupted: `kill` is a no-op and the runner stops
/// listening instead. Stats are always zero.
pub struct BuiltinProcess {
    cmd: Arc<Command>,
    runnable: Runnable,
}

impl BuiltinProcess {
    pub fn new(cmd: Arc<Command>, runnable: Runnable) -> Self {
        Self { cmd, runnable }
    }

    pub fn factory(f: impl Fn(&Command) -> ExecResult<Value> + Send + Sync + 'static) -> ProcessFactory {
        let runnable: Runnable = Arc::new(f);
        Arc::new(move |_table: Arc<dyn PidTable>, cmd: Arc<Command>| -> Box<dyn Process> {
            Box::new(BuiltinProcess::new(cmd, Arc::clone(&runnable)))
        })
    }
}

impl Process for BuiltinProcess {
    fn run(&mut self) -> Result<MessageRx, CoreError> {
        let (tx, rx) = mpsc::channel(2);
        let cmd = Arc::clone(&self.cmd);
        let runnable = Arc::clone(&self.runnable);

        tokio::spawn(async move {
            let id = cmd.id.clone();
            let outcome = tokio::task::spawn_blocking(move || runnable(&cmd)).await;
            let (payload, state) = match outcome {
                Ok(Ok(value)) => (value, JobState::Success),
                Ok(Err(e)) => {
                    debug!(target: "pmd.exec.builtin", %id, error = %e, "builtin failed");
                    (Value::String(e.to_string()), JobState::Error)
                }
                Err(e) => {
                    warn!(target: "pmd.exec.builtin", %id, error = %e, "builtin panicked");
                    (Value::String("builtin panicked".into()), JobState::Error)
                }
            };
            let _ = tx.send(Message::new(Level::RESULT_JSON, payload.to_string())).await;
            let _ = tx.send(Message::exit(state)).await;
        });
        Ok(rx)
    }

    fn kill(&mut self) {}

    fn stats(&mut self) -> ProcessStats {
        ProcessStats::default()
    }
}
