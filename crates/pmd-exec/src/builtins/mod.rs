//! Builtin commands registered on every agent.
//!
//! | command        | arguments   | result                                  |
//! |----------------|-------------|-----------------------------------------|
//! | `core.ping`    |             | `"pong"`                                |
//! | `info.os`      |             | hostname, os, arch, kernel, uptime      |
//! | `info.mem`     |             | `/proc/meminfo` totals in bytes         |
//! | `core.kill`    | `{"id": ..}`| `true`, or an error for an unknown job  |
//! | `core.killall` |             | number of runners signalled             |
//! | `core.jobs`    |             | live jobs with their last resource sample |
mod info;
mod jobs;

use serde_json::json;

use pmd_core::ProcessManager;

use crate::BuiltinProcess;

pub const CORE_PING: &str = "core.ping";
pub const INFO_OS: &str = "info.os";
pub const INFO_MEM: &str = "info.mem";
pub const CORE_KILL: &str = "core.kill";
pub const CORE_KILLALL: &str = "core.killall";
pub const CORE_JOBS: &str = "core.jobs";

/// Registers every builtin on `pm`.
///
/// Job control builtins keep a handle to `pm`, so they live as long as its factory table.
pub fn register_builtins(pm: &ProcessManager) {
    pm.register_factory(CORE_PING, BuiltinProcess::factory(|_| Ok(json!("pong"))));
    pm.register_factory(INFO_OS, BuiltinProcess::factory(|_| info::os()));
    pm.register_factory(INFO_MEM, BuiltinProcess::factory(|_| info::mem()));
    jobs::register(pm);
}
