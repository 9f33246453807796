//! Process variants for the process manager.
//!
//! - [`SystemProcess`]: an OS process in its own process group (`core.system`).
//! - [`ContainerProcess`]: a system process in fresh namespaces under a chroot (`core.container`).
//! - [`BuiltinProcess`]: a Rust function run on the blocking pool.
//! - [`Extension`]: a fixed executable exposed as its own command type.
mod error;
pub use error::{ExecError, ExecResult};

mod builtin;
pub use builtin::{BuiltinProcess, Runnable};

pub mod builtins;
pub use builtins::register_builtins;

#[cfg(feature = "container")]
mod container;
#[cfg(feature = "container")]
pub use container::{ContainerArgs, ContainerProcess};

mod extension;
pub use extension::Extension;

mod meter;
pub use meter::Meter;

mod system;
pub use system::{SystemArgs, SystemProcess};

mod util;

use pmd_core::ProcessManager;

pub const CORE_SYSTEM: &str = "core.system";
pub const CORE_CONTAINER: &str = "core.container";

/// Registers the OS process variants and every builtin on `pm`.
pub fn register_defaults(pm: &ProcessManager) {
    pm.register_factory(CORE_SYSTEM, SystemProcess::factory());
    #[cfg(feature = "container")]
    pm.register_factory(CORE_CONTAINER, ContainerProcess::factory());
    register_builtins(pm);
}

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{BuiltinProcess, Extension, SystemProcess, register_defaults};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pmd_core::PmConfig;
    use pmd_model::{Command, JobState, Level};
    use serde_json::{Value, json};
    use tokio::time::timeout;

    fn manager() -> ProcessManager {
        let pm = ProcessManager::new(PmConfig::default());
        register_defaults(&pm);
        pm
    }

    async fn run(pm: &ProcessManager, cmd: Command) -> pmd_model::JobResult {
        let handle = pm.run_cmd(cmd, Vec::new()).unwrap();
        timeout(Duration::from_secs(10), handle.wait())
            .await
            .expect("job finished in time")
            .expect("job result")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn system_command_result() {
        let pm = manager();
        let cmd = Command::new(CORE_SYSTEM)
            .with_arguments(json!({"name": "sh", "args": ["-c", "echo out; echo err >&2; echo 9::down"]}));
        let res = run(&pm, cmd).await;

        assert_eq!(res.state, JobState::Success);
        assert_eq!(res.streams[0], "out\n");
        assert_eq!(res.streams[1], "err\n");
        assert_eq!(res.critical, "down");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timeout_kills_the_process() {
        let pm = manager();
        let cmd = Command::new(CORE_SYSTEM)
            .with_arguments(json!({"name": "sleep", "args": ["30"]}))
            .with_max_time(1);
        assert_eq!(run(&pm, cmd).await.state, JobState::Timeout);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ping_and_info() {
        let pm = manager();
        let res = run(&pm, Command::new(builtins::CORE_PING)).await;
        assert_eq!((res.state, res.level, res.data.as_str()), (JobState::Success, Level::RESULT_JSON, "\"pong\""));

        let res = run(&pm, Command::new(builtins::INFO_OS)).await;
        let info: Value = serde_json::from_str(&res.data).unwrap();
        assert_eq!(info["arch"], std::env::consts::ARCH);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kill_and_jobs_builtins() {
        let pm = manager();
        let sleeper = Command::new(CORE_SYSTEM)
            .with_id("sleeper")
            .with_arguments(json!({"name": "sleep", "args": ["30"]}));
        let handle = pm.run_cmd(sleeper, Vec::new()).unwrap();

        let jobs = run(&pm, Command::new(builtins::CORE_JOBS)).await;
        let jobs: Value = serde_json::from_str(&jobs.data).unwrap();
        assert!(jobs.as_array().unwrap().iter().any(|j| j["id"] == "sleeper"));

        let missing = run(&pm, Command::new(builtins::CORE_KILL).with_arguments(json!({"id": "nope"}))).await;
        assert_eq!(missing.state, JobState::Error);

        let kill = run(&pm, Command::new(builtins::CORE_KILL).with_arguments(json!({"id": "sleeper"}))).await;
        assert_eq!(kill.state, JobState::Success);
        let res = timeout(Duration::from_secs(10), handle.wait()).await.unwrap().unwrap();
        assert_eq!(res.state, JobState::Killed);
    }
}
