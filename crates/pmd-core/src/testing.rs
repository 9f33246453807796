//! In-memory process and pid table for unit tests.
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use pmd_model::{Message, ProcessStats};

use crate::{CoreError, ExitStatus, MessageRx, Pid, PidError, PidTable, Process, ProcessFactory};

pub(crate) const FAKE_PID: Pid = 4242;

/// Pid table that never reaps.
pub(crate) struct NullTable;

#[async_trait]
impl PidTable for NullTable {
    fn register(&self, spawn: &mut dyn FnMut() -> io::Result<Pid>) -> io::Result<Pid> {
        spawn()
    }

    async fn wait_pid(&self, pid: Pid) -> Result<ExitStatus, PidError> {
        Err(PidError::NotRegistered(pid))
    }
}

/// Replays `messages`; with `hold` the stream stays open until killed.
#[derive(Clone, Default)]
pub(crate) struct Script {
    pub(crate) messages: Vec<Message>,
    pub(crate) hold: bool,
    pub(crate) fail_spawn: bool,
}

impl Script {
    pub(crate) fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub(crate) fn holding(mut self) -> Self {
        self.hold = true;
        self
    }

    /// Factory replaying this script; the counter tracks spawn attempts.
    pub(crate) fn factory(self) -> (ProcessFactory, Arc<AtomicUsize>) {
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&spawned);
        let factory: ProcessFactory = Arc::new(move |table, _cmd| {
            Box::new(Scripted {
                script: self.clone(),
                spawned: Arc::clone(&counter),
                table,
                tx: None,
            })
        });
        (factory, spawned)
    }

    /// Factory replaying `scripts` one per spawn; the last one repeats.
    pub(crate) fn sequence(scripts: Vec<Script>) -> (ProcessFactory, Arc<AtomicUsize>) {
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&spawned);
        let built = AtomicUsize::new(0);
        let factory: ProcessFactory = Arc::new(move |table, _cmd| {
            let n = built.fetch_add(1, Ordering::SeqCst).min(scripts.len() - 1);
            Box::new(Scripted {
                script: scripts[n].clone(),
                spawned: Arc::clone(&counter),
                table,
                tx: None,
            })
        });
        (factory, spawned)
    }
}

struct Scripted {
    script: Script,
    spawned: Arc<AtomicUsize>,
    table: Arc<dyn PidTable>,
    tx: Option<mpsc::Sender<Message>>,
}

impl Process for Scripted {
    fn run(&mut self) -> Result<MessageRx, CoreError> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_spawn {
            return Err(CoreError::spawn("no such binary"));
        }
        self.table
            .register(&mut || Ok(FAKE_PID))
            .map_err(CoreError::spawn)?;

        let (tx, rx) = mpsc::channel(self.script.messages.len() + 1);
        for msg in self.script.messages.drain(..) {
            let _ = tx.try_send(msg);
        }
        if self.script.hold {
            self.tx = Some(tx);
        }
        Ok(rx)
    }

    fn kill(&mut self) {
        self.tx = None;
    }

    fn stats(&mut self) -> ProcessStats {
        ProcessStats {
            cpu: 1.5,
            rss: 1024,
            ..Default::default()
        }
    }
}
