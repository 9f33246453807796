use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use pmd_core::ProcessManager;
use pmd_model::{Command, ProcessStats};

use super::{CORE_JOBS, CORE_KILL, CORE_KILLALL};
use crate::{
    BuiltinProcess,
    error::{ExecError, ExecResult},
};

#[derive(Deserialize)]
struct KillArgs {
    id: String,
}

#[derive(Serialize)]
struct Job {
    id: String,
    command: String,
    stats: ProcessStats,
}

pub(super) fn register(pm: &ProcessManager) {
    let handle = pm.clone();
    pm.register_factory(CORE_KILL, BuiltinProcess::factory(move |cmd| kill(&handle, cmd)));

    let handle = pm.clone();
    pm.register_factory(
        CORE_KILLALL,
        BuiltinProcess::factory(move |cmd| kill_all(&handle, cmd)),
    );

    let handle = pm.clone();
    pm.register_factory(CORE_JOBS, BuiltinProcess::factory(move |cmd| jobs(&handle, cmd)));
}

fn kill(pm: &ProcessManager, cmd: &Command) -> ExecResult<Value> {
    let KillArgs { id } = cmd.arguments()?;
    info!(target: "pmd.exec.builtin", by = %cmd.id, %id, "kill requested");
    if pm.kill(&id) {
        Ok(json!(true))
    } else {
        Err(ExecError::UnknownJob(id))
    }
}

/// Kills every runner except the one executing this command.
fn kill_all(pm: &ProcessManager, cmd: &Command) -> ExecResult<Value> {
    let mut killed = 0;
    for runner in pm.runners() {
        if runner.id() != cmd.id {
            runner.kill();
            killed += 1;
        }
    }
    info!(target: "pmd.exec.builtin", by = %cmd.id, killed, "kill all requested");
    Ok(json!(killed))
}

fn jobs(pm: &ProcessManager, _cmd: &Command) -> ExecResult<Value> {
    let mut jobs: Vec<Job> = pm
        .runners()
        .into_iter()
        .map(|runner| Job {
            id: runner.id().to_string(),
            command: runner.command().command.clone(),
            stats: runner.stats(),
        })
        .collect();
    jobs.sort_by(|a, b| a.id.cmp(&b.id));
    serde_json::to_value(jobs).map_err(|e| ExecError::Builtin(e.to_string()))
}
