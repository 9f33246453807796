//! Process manager: admission, factory registry, runner registry and callbacks.
//!
//! ## Rules
//! - `push_cmd` and queue releases are admitted only while fewer than `max_jobs` runners are live.
//! - `run_cmd` bypasses the bound and the queues.
//! - `push_cmd` hands commands that carry a queue to the queue manager.
//! - Only runners released by the queue manager release the next command of their queue.
//! - Unknown command types and duplicate ids never create a runner; they still yield a result.
//! - A runner leaves the registry after its result was handed to the result handlers.
mod handlers;
pub use handlers::{MessageHandler, ResultHandler};

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use tokio::{
    sync::{Notify, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use pmd_model::{Command, JobResult, JobState, Message, Route};
use pmd_stats::{FlushHandler, Snapshot};

use crate::{
    CoreError, PidRegistry, PidTable, PmConfig, ProcessFactory, RunnerHook,
    queue::QueueManager,
    runner::{Runner, RunnerEvents, RunnerHandle},
};
use handlers::Handlers;

/// Cloneable handle to the process manager.
#[derive(Clone)]
pub struct ProcessManager {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    config: PmConfig,
    table: Arc<dyn PidTable>,
    factories: RwLock<HashMap<String, ProcessFactory>>,
    runners: Mutex<HashMap<String, RunnerHandle>>,
    changed: Notify,
    handlers: RwLock<Handlers>,
    queue: QueueManager,
    cmds: mpsc::Sender<Command>,
    cmds_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl ProcessManager {
    /// Manager spawning through the process-wide pid table.
    pub fn new(config: PmConfig) -> Self {
        Self::with_pid_table(config, PidRegistry::shared())
    }

    pub fn with_pid_table(config: PmConfig, table: Arc<dyn PidTable>) -> Self {
        let (cmds, cmds_rx) = mpsc::channel(config.max_jobs());
        Self {
            shared: Arc::new(Shared {
                config,
                table,
                factories: RwLock::new(HashMap::new()),
                runners: Mutex::new(HashMap::new()),
                changed: Notify::new(),
                handlers: RwLock::new(Handlers::default()),
                queue: QueueManager::new(),
                cmds,
                cmds_rx: Mutex::new(Some(cmds_rx)),
            }),
        }
    }

    pub fn config(&self) -> &PmConfig {
        &self.shared.config
    }

    /// Starts admission and the queue tasks. Runs until `token` is cancelled.
    pub fn start(&self, token: CancellationToken) -> Result<JoinHandle<()>, CoreError> {
        let mut cmds = lock(&self.shared.cmds_rx)
            .take()
            .ok_or(CoreError::AlreadyStarted)?;

        let (queued_tx, mut queued) = mpsc::channel(1);
        self.shared
            .queue
            .start(queued_tx, token.clone())
            .ok_or(CoreError::AlreadyStarted)?;

        let pm = self.clone();
        let handle = tokio::spawn(async move {
            info!(target: "pmd.core.manager", max_jobs = pm.shared.config.max_jobs(), "process manager started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = pm.wait_capacity() => {}
                }
                let (cmd, from_queue) = tokio::select! {
                    _ = token.cancelled() => break,
                    Some(cmd) = cmds.recv() => (cmd, false),
                    Some(cmd) = queued.recv() => (cmd, true),
                    else => break,
                };
                if let Err(e) = pm.spawn_runner(cmd.clone(), Vec::new(), from_queue) {
                    debug!(target: "pmd.core.manager", id = %cmd.id, error = %e, "command rejected");
                    if from_queue {
                        pm.shared.queue.notify(&cmd);
                    }
                }
            }
            info!(target: "pmd.core.manager", "process manager stopped");
        });
        Ok(handle)
    }

    pub fn register_factory(&self, kind: impl Into<String>, factory: ProcessFactory) {
        let kind = kind.into();
        debug!(target: "pmd.core.manager", %kind, "factory registered");
        self.shared
            .factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, factory);
    }

    pub fn unregister_factory(&self, kind: &str) -> bool {
        self.shared
            .factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(kind)
            .is_some()
    }

    /// Submits a command for admission under the `max_jobs` bound.
    ///
    /// A command carrying a queue waits for its turn in that queue first.
    pub async fn push_cmd(&self, cmd: Command) -> Result<(), CoreError> {
        if !cmd.queue.is_empty() {
            return self.push_cmd_to_queue(cmd).await;
        }
        self.shared.cmds.send(cmd).await.map_err(|_| CoreError::Closed)
    }

    /// Submits a command to its queue; commands without a queue are pushed directly.
    pub async fn push_cmd_to_queue(&self, cmd: Command) -> Result<(), CoreError> {
        if cmd.queue.is_empty() {
            return self.shared.cmds.send(cmd).await.map_err(|_| CoreError::Closed);
        }
        if self.shared.queue.push(cmd) {
            Ok(())
        } else {
            Err(CoreError::Closed)
        }
    }

    /// Starts a runner immediately, bypassing admission.
    #[instrument(level = "debug", skip(self, cmd, hooks), fields(id = %cmd.id, command = %cmd.command))]
    pub fn run_cmd(
        &self,
        cmd: Command,
        hooks: Vec<Arc<dyn RunnerHook>>,
    ) -> Result<RunnerHandle, CoreError> {
        self.spawn_runner(cmd, hooks, false)
    }

    fn spawn_runner(
        &self,
        cmd: Command,
        hooks: Vec<Arc<dyn RunnerHook>>,
        from_queue: bool,
    ) -> Result<RunnerHandle, CoreError> {
        let factory = self
            .shared
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&cmd.command)
            .cloned();
        let Some(factory) = factory else {
            warn!(target: "pmd.core.manager", id = %cmd.id, command = %cmd.command, "unknown command");
            self.shared.reject(&cmd, JobState::UnknownCommand);
            return Err(CoreError::UnknownCommand(cmd.command));
        };

        let mut runners = lock(&self.shared.runners);
        if runners.contains_key(&cmd.id) {
            drop(runners);
            warn!(target: "pmd.core.manager", id = %cmd.id, "duplicate job id");
            self.shared.reject(&cmd, JobState::DuplicateId);
            return Err(CoreError::DuplicateId(cmd.id));
        }

        let events: Arc<dyn RunnerEvents> = self.shared.clone();
        let (runner, handle) = Runner::new(
            cmd,
            factory,
            hooks,
            Arc::clone(&self.shared.table),
            self.shared.config.clone(),
            events,
        );
        let runner = runner.released_by_queue(from_queue);
        runners.insert(handle.id().to_string(), handle.clone());
        drop(runners);

        runner.start();
        Ok(handle)
    }

    pub fn add_message_handler(&self, handler: impl Fn(&Command, &Message) + Send + Sync + 'static) {
        self.shared.handlers_mut().message.push(Arc::new(handler));
    }

    pub fn add_result_handler(
        &self,
        handler: impl Fn(&Command, &JobResult) + Send + Sync + 'static,
    ) {
        self.shared.handlers_mut().result.push(Arc::new(handler));
    }

    /// Result handler invoked only for commands carrying `route`.
    pub fn add_route_result_handler(
        &self,
        route: Route,
        handler: impl Fn(&Command, &JobResult) + Send + Sync + 'static,
    ) {
        self.shared
            .handlers_mut()
            .route
            .entry(route)
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn add_stats_flush_handler(&self, handler: impl Fn(&Snapshot) + Send + Sync + 'static) {
        let handler: FlushHandler = Arc::new(handler);
        self.shared.handlers_mut().stats.push(handler);
    }

    /// Kills the runner of `id`. Returns `false` if no such runner is live.
    pub fn kill(&self, id: &str) -> bool {
        match self.runner(id) {
            Some(runner) => {
                runner.kill();
                true
            }
            None => false,
        }
    }

    pub fn kill_all(&self) {
        for runner in self.runners() {
            runner.kill();
        }
    }

    pub fn runner(&self, id: &str) -> Option<RunnerHandle> {
        lock(&self.shared.runners).get(id).cloned()
    }

    pub fn runners(&self) -> Vec<RunnerHandle> {
        lock(&self.shared.runners).values().cloned().collect()
    }

    async fn wait_capacity(&self) {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if lock(&self.shared.runners).len() < self.shared.config.max_jobs() {
                return;
            }
            notified.await;
        }
    }
}

impl Shared {
    fn handlers(&self) -> std::sync::RwLockReadGuard<'_, Handlers> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn handlers_mut(&self) -> std::sync::RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn reject(&self, cmd: &Command, state: JobState) {
        let mut result = JobResult::new(cmd, state);
        self.result(cmd, &mut result);
    }
}

impl RunnerEvents for Shared {
    fn message(&self, cmd: &Command, msg: &Message) {
        if !cmd.accepts(msg.level) {
            return;
        }
        let handlers = self.handlers().for_message();
        for handler in handlers {
            handler(cmd, msg);
        }
    }

    fn stats(&self, snapshot: &Snapshot) {
        let handlers = self.handlers().for_stats();
        for handler in handlers {
            handler(snapshot);
        }
    }

    fn result(&self, cmd: &Command, result: &mut JobResult) {
        result.tags = cmd.tags.clone();
        let handlers = self.handlers().for_result(cmd);
        for handler in handlers {
            handler(cmd, result);
        }
    }

    fn finished(&self, cmd: &Command, from_queue: bool) {
        lock(&self.runners).remove(&cmd.id);
        if from_queue {
            self.queue.notify(cmd);
        }
        self.changed.notify_waiters();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
