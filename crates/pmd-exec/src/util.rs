use std::{os::unix::process::CommandExt, process::Command};

use nix::{
    sys::signal::{Signal, kill, killpg},
    unistd::Pid as RawPid,
};
use pmd_core::Pid;
use tracing::trace;

/// Program with arguments, started in its own process group.
pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd.process_group(0);
    cmd
}

/// Sends `signal` to the process group led by `pid`. A group that is gone is ignored.
pub fn signal_group(pid: Pid, signal: Signal) {
    trace!(target: "pmd.exec", pid, signal = signal.as_str(), "signal process group");
    let _ = killpg(RawPid::from_raw(pid), signal);
}

/// Sends `signal` to a single process. A pid that is gone is ignored.
pub fn signal_pid(pid: Pid, signal: Signal) {
    let _ = kill(RawPid::from_raw(pid), signal);
}

/// Replaces `{key}` placeholders with values from `input`.
///
/// Strings are inserted verbatim, other values as JSON. Unknown placeholders are kept.
pub fn format_template(template: &str, input: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let key = &tail[1..close];
        match input.get(key) {
            Some(serde_json::Value::String(s)) => out.push_str(s),
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }
    out.push_str(rest);
    out
}
