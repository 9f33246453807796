use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sysinfo::System;

use crate::error::{ExecError, ExecResult};

#[derive(Debug, Serialize)]
struct OsInfo {
    hostname: String,
    os: &'static str,
    arch: &'static str,
    kernel: String,
    uptime: u64,
}

pub(super) fn os() -> ExecResult<Value> {
    let hostname = hostname::get()?.to_string_lossy().into_owned();
    let kernel = System::kernel_version().unwrap_or_default();
    let uptime = System::uptime();

    to_value(OsInfo {
        hostname,
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        kernel,
        uptime,
    })
}

pub(super) fn mem() -> ExecResult<Value> {
    let mut system = System::new();
    system.refresh_memory();

    to_value(BTreeMap::from([
        ("total", system.total_memory()),
        ("available", system.available_memory()),
        ("used", system.used_memory()),
        ("free", system.free_memory()),
        ("swap_total", system.total_swap()),
        ("swap_free", system.free_swap()),
        ("swap_used", system.used_swap()),
    ]))
}

fn to_value(v: impl Serialize) -> ExecResult<Value> {
    serde_json::to_value(v).map_err(|e| ExecError::Builtin(e.to_string()))
}
