use std::{collections::HashSet, sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use pmd_model::{After, Startup};

use super::{StartupTree, StateMachine};
use crate::{DelayHook, ExitHook, MatchHook, ProcessManager, RunnerHook};

const SETTLE_DELAY: Duration = Duration::from_secs(2);

impl ProcessManager {
    /// Boots the tree as three cohorts: init, networking, then everything else.
    pub async fn boot(&self, tree: &StartupTree) {
        let cohorts = [
            ("init", After::Init.weight(), After::Net.weight()),
            ("net", After::Net.weight(), After::Boot.weight()),
            ("boot", After::Boot.weight(), After::END),
        ];
        for (name, low, high) in cohorts {
            let slice = tree.slice(low, high);
            if slice.is_empty() {
                continue;
            }
            info!(target: "pmd.core.boot", cohort = name, entries = slice.len(), "booting cohort");
            self.run_slice(&slice).await;
        }
        info!(target: "pmd.core.boot", "boot finished");
    }

    /// Starts every entry concurrently, gated on its dependencies, and waits until each one
    /// is up or has failed.
    pub async fn run_slice(&self, slice: &[Startup]) {
        let state = Arc::new(StateMachine::new());
        let provided: HashSet<&str> = slice.iter().map(|s| s.key.as_str()).collect();
        let mut needed = HashSet::new();

        for entry in slice {
            let deps: Vec<String> = entry
                .after
                .iter()
                .filter(|dep| After::parse(dep).is_none())
                .cloned()
                .collect();
            needed.extend(deps.iter().cloned());

            let pm = self.clone();
            let state = Arc::clone(&state);
            let entry = entry.clone();
            tokio::spawn(async move { pm.boot_entry(entry, deps, state).await });
        }

        for key in needed.iter().filter(|k| !provided.contains(k.as_str())) {
            debug!(target: "pmd.core.boot", %key, "auto releasing");
            state.release(key, true);
        }

        let all: Vec<&str> = provided.into_iter().collect();
        state.wait_all(&all).await;
    }

    async fn boot_entry(&self, entry: Startup, deps: Vec<String>, state: Arc<StateMachine>) {
        debug!(target: "pmd.core.boot", key = %entry.key, ?deps, "waiting for dependencies");
        if !state.wait(&deps).await {
            error!(target: "pmd.core.boot", key = %entry.key, "dependency failed, not starting");
            state.release(&entry.key, false);
            return;
        }

        info!(target: "pmd.core.boot", key = %entry.key, command = %entry.name, "starting");
        let hooks = readiness_hooks(&entry, &state);
        if let Err(e) = self.run_cmd(entry.to_command(), hooks) {
            error!(target: "pmd.core.boot", key = %entry.key, error = %e, "failed to start");
            state.release(&entry.key, false);
        }
    }
}

fn readiness_hooks(entry: &Startup, state: &Arc<StateMachine>) -> Vec<Arc<dyn RunnerHook>> {
    let release = |value: bool| {
        let state = Arc::clone(state);
        let key = entry.key.clone();
        move || {
            state.release(&key, value);
        }
    };

    let mut hooks: Vec<Arc<dyn RunnerHook>> = Vec::new();
    match entry.running_match.as_deref() {
        Some(pattern) => match MatchHook::new(pattern, release(true)) {
            Ok(hook) => hooks.push(Arc::new(hook)),
            Err(e) => warn!(target: "pmd.core.boot", key = %entry.key, error = %e, "ignoring running match"),
        },
        None if entry.running_delay >= 0 => {
            let delay = match entry.running_delay {
                0 => SETTLE_DELAY,
                secs => Duration::from_secs(secs.unsigned_abs()),
            };
            hooks.push(Arc::new(DelayHook::new(delay, release(true))));
        }
        None => {}
    }

    let state = Arc::clone(state);
    let key = entry.key.clone();
    hooks.push(Arc::new(ExitHook::new(move |ok| {
        state.release(&key, ok);
    })));
    hooks
}
