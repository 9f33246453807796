use std::{
    collections::HashMap,
    io,
    sync::{
        Arc, Mutex, MutexGuard, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{error, trace};

use super::{ExitStatus, Pid, PidError, PidTable, reaper};

#[derive(Default)]
struct Entries {
    senders: HashMap<Pid, oneshot::Sender<ExitStatus>>,
    receivers: HashMap<Pid, oneshot::Receiver<ExitStatus>>,
}

/// Pid to completion-channel table served by the process-wide reaper.
///
/// `wait4(-1)` collects every child of the OS process, so there is exactly one instance per process:
/// obtain it with [`PidRegistry::shared`].
pub struct PidRegistry {
    entries: Mutex<Entries>,
    reaping: AtomicBool,
}

impl PidRegistry {
    /// Returns the process-wide table, starting the reaper on first use.
    pub fn shared() -> Arc<PidRegistry> {
        static SHARED: OnceLock<Arc<PidRegistry>> = OnceLock::new();

        SHARED
            .get_or_init(|| {
                let registry = Arc::new(PidRegistry {
                    entries: Mutex::new(Entries::default()),
                    reaping: AtomicBool::new(false),
                });
                match reaper::start(Arc::clone(&registry)) {
                    Ok(()) => registry.reaping.store(true, Ordering::Release),
                    Err(e) => error!(target: "pmd.core.pid", error = %e, "failed to start reaper"),
                }
                registry
            })
            .clone()
    }

    /// Number of registered pids whose status was not yet delivered.
    pub fn pending(&self) -> usize {
        self.lock().senders.len()
    }

    /// Collects every child that is ready right now and hands each status to its waiter.
    ///
    /// Holds the table lock for the whole drain: a pid being spawned under `register`
    /// can only be collected once its entry exists.
    pub(super) fn reap(&self) {
        let mut entries = self.lock();
        while let Some(status) = reaper::wait_any() {
            match entries.senders.remove(&status.pid) {
                Some(tx) => {
                    trace!(target: "pmd.core.pid", pid = status.pid, code = ?status.code, signal = ?status.signal, "reaped");
                    let _ = tx.send(status);
                }
                None => trace!(target: "pmd.core.pid", pid = status.pid, "untracked child reaped"),
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PidTable for PidRegistry {
    fn register(&self, spawn: &mut dyn FnMut() -> io::Result<Pid>) -> io::Result<Pid> {
        if !self.reaping.load(Ordering::Acquire) {
            return Err(io::Error::other("pid reaper is not running"));
        }

        let mut entries = self.lock();
        let pid = spawn()?;

        let (tx, rx) = oneshot::channel();
        entries.senders.insert(pid, tx);
        entries.receivers.insert(pid, rx);
        Ok(pid)
    }

    async fn wait_pid(&self, pid: Pid) -> Result<ExitStatus, PidError> {
        let rx = self
            .lock()
            .receivers
            .remove(&pid)
            .ok_or(PidError::NotRegistered(pid))?;
        rx.await.map_err(|_| PidError::Lost(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn spawn_exit(code: i32) -> io::Result<Pid> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(format!("exit {code}"))
            .spawn()?;
        Ok(child.id() as Pid)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_status_reaches_its_own_waiter() {
        let table = PidRegistry::shared();

        let mut jobs = Vec::new();
        for i in 0..100 {
            let table = Arc::clone(&table);
            jobs.push(tokio::spawn(async move {
                let code = i % 50;
                let pid = table.register(&mut || spawn_exit(code)).unwrap();
                let status = table.wait_pid(pid).await.unwrap();
                (pid, code, status)
            }));
        }

        for job in jobs {
            let (pid, code, status) = job.await.unwrap();
            assert_eq!(status.pid, pid);
            assert_eq!(status.code, Some(code));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_spawn_leaves_no_entry() {
        let table = PidRegistry::shared();
        let err = table
            .register(&mut || Err(io::Error::new(io::ErrorKind::NotFound, "nope")))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pid_is_awaited_once() {
        let table = PidRegistry::shared();
        let pid = table.register(&mut || spawn_exit(0)).unwrap();

        assert!(table.wait_pid(pid).await.unwrap().success());
        assert_eq!(table.wait_pid(pid).await, Err(PidError::NotRegistered(pid)));
    }
}
