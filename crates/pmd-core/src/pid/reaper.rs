use std::{io, sync::Arc, sync::mpsc, thread, time::Duration};

use nix::{
    errno::Errno,
    sys::wait::{WaitPidFlag, WaitStatus, waitpid},
};
use tokio::{
    runtime,
    signal::unix::{SignalKind, signal},
    time,
};
use tracing::{debug, warn};

use super::{ExitStatus, PidRegistry};

/// Wakes the reaper even when a SIGCHLD got lost before the handler was installed.
const SAFETY_TICK: Duration = Duration::from_secs(1);

/// Starts the reaper thread and returns once the SIGCHLD listener is installed.
///
/// The reaper gets its own runtime so it outlives any runtime that happens to create the registry.
pub(super) fn start(registry: Arc<PidRegistry>) -> io::Result<()> {
    let (ready_tx, ready_rx) = mpsc::channel::<io::Result<()>>();

    thread::Builder::new()
        .name("pmd-reaper".into())
        .spawn(move || {
            let rt = match runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            rt.block_on(async move {
                let mut sigchld = match signal(SignalKind::child()) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                debug!(target: "pmd.core.pid", "reaper started");

                let mut tick = time::interval(SAFETY_TICK);
                loop {
                    tokio::select! {
                        _ = sigchld.recv() => {}
                        _ = tick.tick() => {}
                    }
                    registry.reap();
                }
            });
        })?;

    ready_rx
        .recv()
        .map_err(|_| io::Error::other("reaper thread exited before start"))?
}

/// Non-blocking `waitpid(-1)`; `None` when no child has exited.
pub(super) fn wait_any() -> Option<ExitStatus> {
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return None,
            Ok(status) => {
                if let Some(exit) = ExitStatus::from_wait(status) {
                    return Some(exit);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return None,
            Err(e) => {
                warn!(target: "pmd.core.pid", error = %e, "waitpid failed");
                return None;
            }
        }
    }
}
