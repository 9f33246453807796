//! Per-queue serialization.
//!
//! ```text
//!   push(cmd) ─► dispatcher ─► lanes[cmd.queue].push_back
//!                   │ new lane
//!                   ▼
//!               signal(queue) ─► producer ─► lanes[queue].pop_front ─► manager
//!                   ▲
//!   notify(cmd) ────┘ (runner of that queue finished)
//! ```
//!
//! ## Rules
//! - At most one command per queue is out at a time; lanes are strict FIFO.
//! - A lane found empty by the producer is dropped; the next push recreates it.
//! - Commands without a queue are rejected here; the manager runs them directly.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use pmd_model::Command;

struct Lanes {
    lanes: Mutex<HashMap<String, VecDeque<Command>>>,
    signal: mpsc::UnboundedSender<String>,
}

impl Lanes {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Command>>> {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, cmd: Command) {
        let mut lanes = self.lock();
        match lanes.get_mut(&cmd.queue) {
            Some(lane) => {
                trace!(target: "pmd.core.queue", queue = %cmd.queue, id = %cmd.id, depth = lane.len() + 1, "queued");
                lane.push_back(cmd);
            }
            None => {
                let name = cmd.queue.clone();
                lanes.insert(name.clone(), VecDeque::from([cmd]));
                let _ = self.signal.send(name);
            }
        }
    }

    fn pop(&self, queue: &str) -> Option<Command> {
        let mut lanes = self.lock();
        let lane = lanes.get_mut(queue)?;
        match lane.pop_front() {
            Some(cmd) => Some(cmd),
            None => {
                lanes.remove(queue);
                trace!(target: "pmd.core.queue", queue, "lane drained");
                None
            }
        }
    }
}

struct Receivers {
    consumer: mpsc::UnboundedReceiver<Command>,
    signal: mpsc::UnboundedReceiver<String>,
}

pub(crate) struct QueueManager {
    lanes: Arc<Lanes>,
    consumer: mpsc::UnboundedSender<Command>,
    receivers: Mutex<Option<Receivers>>,
}

impl QueueManager {
    pub(crate) fn new() -> Self {
        let (consumer_tx, consumer_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            lanes: Arc::new(Lanes {
                lanes: Mutex::new(HashMap::new()),
                signal: signal_tx,
            }),
            consumer: consumer_tx,
            receivers: Mutex::new(Some(Receivers {
                consumer: consumer_rx,
                signal: signal_rx,
            })),
        }
    }

    /// Appends a command to its lane. Returns `false` for commands without a queue.
    pub(crate) fn push(&self, cmd: Command) -> bool {
        if cmd.queue.is_empty() {
            warn!(target: "pmd.core.queue", id = %cmd.id, "command has no queue");
            return false;
        }
        self.consumer.send(cmd).is_ok()
    }

    /// Releases the next command of `cmd`'s queue.
    pub(crate) fn notify(&self, cmd: &Command) {
        if !cmd.queue.is_empty() {
            let _ = self.lanes.signal.send(cmd.queue.clone());
        }
    }

    /// Spawns the dispatcher and the producer; released commands are sent to `out`.
    ///
    /// Returns `None` if already started.
    pub(crate) fn start(
        &self,
        out: mpsc::Sender<Command>,
        token: CancellationToken,
    ) -> Option<[JoinHandle<()>; 2]> {
        let Receivers {
            mut consumer,
            mut signal,
        } = self
            .receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()?;

        let lanes = Arc::clone(&self.lanes);
        let dispatch_token = token.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = dispatch_token.cancelled() => break,
                    cmd = consumer.recv() => match cmd {
                        Some(cmd) => lanes.enqueue(cmd),
                        None => break,
                    },
                }
            }
        });

        let lanes = Arc::clone(&self.lanes);
        let producer = tokio::spawn(async move {
            loop {
                let queue = tokio::select! {
                    _ = token.cancelled() => break,
                    queue = signal.recv() => match queue {
                        Some(queue) => queue,
                        None => break,
                    },
                };
                let Some(cmd) = lanes.pop(&queue) else {
                    continue;
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = out.send(cmd) => if sent.is_err() { break },
                }
            }
        });

        Some([dispatcher, producer])
    }
}
