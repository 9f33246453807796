//! Runner: the supervisor of one command.
//!
//! ```text
//!   ┌──────────► spawn ──► drain ──► exit hooks ──┐
//!   │                                             │
//!   │   KILLED ───────────────────────────────────┼──► final result
//!   │   failed, runs < max_restart: restart_delay │
//!   │   recurring_period > 0: period              │
//!   └────────── cancellable sleep ◄───────────────┘
//! ```
//!
//! ## Rules
//! - Kill is one-shot and idempotent; a kill during a sleep prevents the next spawn.
//! - A killed runner is never restarted.
//! - Timeout kills the process but keeps draining until its stream closes.
//! - A stream that closes without an exit state counts as `ERROR`.
//! - A spawn failure is terminal.
//! - Exactly one `JobResult` is delivered per runner.
use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::{
    sync::watch,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pmd_model::{Command, JobResult, JobState, Level, Message, ProcessStats};
use pmd_stats::{FlushHandler, Snapshot, Statsd};

use crate::{
    ExitStatus, Pid, PidError, PidTable, PmConfig, ProcessFactory, RunnerHook, stream::RingBuffer,
};

/// Callbacks from a runner into its owner.
pub(crate) trait RunnerEvents: Send + Sync {
    fn message(&self, cmd: &Command, msg: &Message);
    fn stats(&self, snapshot: &Snapshot);
    fn result(&self, cmd: &Command, result: &mut JobResult);
    /// `from_queue` is set for runners released by the queue manager.
    fn finished(&self, cmd: &Command, from_queue: bool);
}

/// Handle to a live runner.
#[derive(Clone)]
pub struct RunnerHandle {
    command: Arc<Command>,
    kill: CancellationToken,
    result: watch::Receiver<Option<JobResult>>,
    stats: Arc<Mutex<ProcessStats>>,
}

impl RunnerHandle {
    pub fn id(&self) -> &str {
        &self.command.id
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Requests termination. Never blocks; repeated calls are no-ops.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Last resource sample of the running process.
    pub fn stats(&self) -> ProcessStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits for the final result. `None` if the runner task died without one.
    pub async fn wait(&self) -> Option<JobResult> {
        let mut rx = self.result.clone();
        let res = rx.wait_for(Option::is_some).await.ok()?;
        res.clone()
    }
}

pub(crate) struct Runner {
    command: Arc<Command>,
    factory: ProcessFactory,
    hooks: Vec<Arc<dyn RunnerHook>>,
    table: Arc<dyn PidTable>,
    config: PmConfig,
    events: Arc<dyn RunnerEvents>,
    kill: CancellationToken,
    result: watch::Sender<Option<JobResult>>,
    stats: Arc<Mutex<ProcessStats>>,
    from_queue: bool,
}

enum Attempt {
    Ran(JobResult),
    SpawnFailed(JobResult),
}

impl Runner {
    pub(crate) fn new(
        command: Command,
        factory: ProcessFactory,
        hooks: Vec<Arc<dyn RunnerHook>>,
        table: Arc<dyn PidTable>,
        config: PmConfig,
        events: Arc<dyn RunnerEvents>,
    ) -> (Self, RunnerHandle) {
        let command = Arc::new(command);
        let kill = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        let stats = Arc::new(Mutex::new(ProcessStats::default()));

        // Pid hooks see every spawn of every process variant.
        let table: Arc<dyn PidTable> = Arc::new(HookedTable {
            inner: table,
            hooks: hooks.clone(),
        });

        let handle = RunnerHandle {
            command: Arc::clone(&command),
            kill: kill.clone(),
            result: rx,
            stats: Arc::clone(&stats),
        };
        let runner = Self {
            command,
            factory,
            hooks,
            table,
            config,
            events,
            kill,
            result: tx,
            stats,
            from_queue: false,
        };
        (runner, handle)
    }

    pub(crate) fn released_by_queue(mut self, from_queue: bool) -> Self {
        self.from_queue = from_queue;
        self
    }

    pub(crate) fn start(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let events = Arc::clone(&self.events);
        let on_flush: FlushHandler = Arc::new(move |s: &Snapshot| events.stats(s));
        let statsd = Statsd::spawn(self.command.id.clone(), self.stats_interval(), on_flush);

        let mut runs: u32 = 0;
        let mut result = loop {
            let started = Instant::now();
            let mut result = match self.run_once(&statsd).await {
                Attempt::Ran(result) => result,
                Attempt::SpawnFailed(result) => {
                    self.fire_exit(result.state);
                    break result;
                }
            };
            self.fire_exit(result.state);

            if result.state == JobState::Killed {
                break result;
            }

            let mut delay = None;
            if !result.state.is_success() && self.command.max_restart > 0 {
                if started.elapsed() >= self.config.stability_window {
                    runs = 0;
                }
                runs += 1;
                if runs < self.command.max_restart {
                    delay = Some(self.config.restart_delay);
                }
            }
            if delay.is_none() && self.command.recurring_period > 0 {
                if result.state.is_success() {
                    runs = 0;
                }
                delay = Some(Duration::from_secs(self.command.recurring_period));
            }

            let Some(delay) = delay else {
                break result;
            };
            debug!(
                target: "pmd.core.runner",
                id = %self.command.id,
                state = %result.state,
                runs,
                delay_ms = delay.as_millis() as u64,
                "next run scheduled",
            );

            tokio::select! {
                _ = self.kill.cancelled() => {
                    result.state = JobState::Killed;
                    break result;
                }
                _ = time::sleep(delay) => {}
            }
        };

        statsd.stop().await;

        info!(target: "pmd.core.runner", id = %self.command.id, state = %result.state, time_ms = result.time, "job finished");
        self.events.result(&self.command, &mut result);
        self.events.finished(&self.command, self.from_queue);
        let _ = self.result.send(Some(result));
    }

    async fn run_once(&self, statsd: &Statsd) -> Attempt {
        let mut result = JobResult::new(&self.command, JobState::Error);
        result.start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let started = Instant::now();

        let mut process = (self.factory)(Arc::clone(&self.table), Arc::clone(&self.command));
        let mut rx = match process.run() {
            Ok(rx) => rx,
            Err(e) => {
                warn!(target: "pmd.core.runner", id = %self.command.id, error = %e, "process failed to start");
                result.streams[1] = format!("{e}\n");
                result.time = started.elapsed().as_millis() as u64;
                return Attempt::SpawnFailed(result);
            }
        };
        debug!(target: "pmd.core.runner", id = %self.command.id, "process started");

        let cap = self.config.stream_buffer_lines();
        let mut stdout = RingBuffer::new(cap);
        let mut stderr = RingBuffer::new(cap);
        let mut state: Option<JobState> = None;

        let max_time = Duration::from_secs(self.command.max_time);
        let timeout = time::sleep(max_time);
        tokio::pin!(timeout);
        let mut timed_out = false;

        let meter_period = self.config.meter_interval();
        let mut meter = time::interval_at(Instant::now() + meter_period, meter_period);
        let tick_period = self.config.hook_tick();
        let mut ticker = time::interval_at(Instant::now() + tick_period, tick_period);

        loop {
            tokio::select! {
                _ = self.kill.cancelled() => {
                    debug!(target: "pmd.core.runner", id = %self.command.id, "kill requested");
                    process.kill();
                    state = Some(JobState::Killed);
                    break;
                }
                _ = &mut timeout, if !max_time.is_zero() && !timed_out => {
                    warn!(target: "pmd.core.runner", id = %self.command.id, max_time = self.command.max_time, "job timed out");
                    process.kill();
                    state = Some(JobState::Timeout);
                    timed_out = true;
                }
                _ = meter.tick() => self.meter(process.stats(), statsd),
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    for hook in &self.hooks {
                        hook.tick(elapsed);
                    }
                }
                msg = rx.recv() => {
                    let Some(mut msg) = msg else { break };
                    msg.stamp();
                    for hook in &self.hooks {
                        hook.message(&msg);
                    }
                    self.events.message(&self.command, &msg);

                    match msg.level {
                        Level::EXIT_STATE => {
                            if !timed_out {
                                state = Some(msg.content.parse().unwrap_or(JobState::Error));
                            }
                            break;
                        }
                        Level::STDOUT => stdout.push(msg.content),
                        Level::STDERR => stderr.push(msg.content),
                        Level::STATSD => statsd.feed(msg.content),
                        Level::CRITICAL => result.critical = msg.content,
                        level if level.is_result() => {
                            result.level = level;
                            result.data = msg.content;
                        }
                        _ => {}
                    }
                }
            }
        }

        // Whatever is still buffered belongs to a finished run.
        while rx.recv().await.is_some() {}

        result.state = state.unwrap_or(JobState::Error);
        result.streams = [stdout.contents(), stderr.contents()];
        result.time = started.elapsed().as_millis() as u64;
        Attempt::Ran(result)
    }

    fn meter(&self, sample: ProcessStats, statsd: &Statsd) {
        statsd.feed(format!("_cpu_:{}|g", sample.cpu));
        statsd.feed(format!("_rss_:{}|g", sample.rss));
        statsd.feed(format!("_vms_:{}|g", sample.vms));
        statsd.feed(format!("_swap_:{}|g", sample.swap));
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = sample;
    }

    fn fire_exit(&self, state: JobState) {
        for hook in &self.hooks {
            hook.exit(state);
        }
    }

    fn stats_interval(&self) -> Duration {
        if self.command.stats_interval > 0 {
            Duration::from_secs(self.command.stats_interval)
        } else {
            self.config.stats_interval()
        }
    }
}

/// Forwards to the manager's table and reports every spawned pid to the hooks.
struct HookedTable {
    inner: Arc<dyn PidTable>,
    hooks: Vec<Arc<dyn RunnerHook>>,
}

#[async_trait]
impl PidTable for HookedTable {
    fn register(&self, spawn: &mut dyn FnMut() -> std::io::Result<Pid>) -> std::io::Result<Pid> {
        let pid = self.inner.register(spawn)?;
        for hook in &self.hooks {
            hook.pid(pid);
        }
        Ok(pid)
    }

    async fn wait_pid(&self, pid: Pid) -> Result<ExitStatus, PidError> {
        self.inner.wait_pid(pid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ExitHook, PidHook,
        testing::{FAKE_PID, NullTable, Script},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<Message>>,
        results: Mutex<Vec<JobResult>>,
        snapshots: Mutex<Vec<Snapshot>>,
        finished: AtomicUsize,
    }

    impl RunnerEvents for Recorder {
        fn message(&self, _cmd: &Command, msg: &Message) {
            self.messages.lock().unwrap().push(msg.clone());
        }
        fn stats(&self, snapshot: &Snapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }
        fn result(&self, _cmd: &Command, result: &mut JobResult) {
            self.results.lock().unwrap().push(result.clone());
        }
        fn finished(&self, _cmd: &Command, _from_queue: bool) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn start(
        script: Script,
        cmd: Command,
        hooks: Vec<Arc<dyn RunnerHook>>,
    ) -> (RunnerHandle, Arc<Recorder>, Arc<AtomicUsize>) {
        let (factory, spawned) = script.factory();
        let (handle, recorder) = start_with(factory, PmConfig::default(), cmd, hooks);
        (handle, recorder, spawned)
    }

    fn start_with(
        factory: ProcessFactory,
        config: PmConfig,
        cmd: Command,
        hooks: Vec<Arc<dyn RunnerHook>>,
    ) -> (RunnerHandle, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let events: Arc<dyn RunnerEvents> = recorder.clone();
        let (runner, handle) = Runner::new(cmd, factory, hooks, Arc::new(NullTable), config, events);
        runner.start();
        (handle, recorder)
    }

    fn exits(state: JobState) -> Script {
        Script::new(vec![Message::exit(state)])
    }

    async fn first_message(rec: &Recorder) {
        while rec.messages.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_success() {
        let script = Script::new(vec![
            Message::new(Level::STDOUT, "hello"),
            Message::exit(JobState::Success),
        ]);
        let (handle, rec, spawned) = start(script, Command::new("test"), Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Success);
        assert_eq!(res.streams[0], "hello\n");
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert_eq!(rec.results.lock().unwrap().len(), 1);
        assert_eq!(rec.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_job_spawns_max_restart_times() {
        let script = Script::new(vec![Message::exit(JobState::Error)]);
        let (handle, rec, spawned) =
            start(script, Command::new("test").with_max_restart(3), Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Error);
        assert_eq!(spawned.load(Ordering::SeqCst), 3);
        assert_eq!(rec.results.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_without_exit_state_is_error() {
        let script = Script::new(vec![Message::new(Level::STDERR, "bye")]);
        let (handle, _rec, _) = start(script, Command::new("test"), Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Error);
        assert_eq!(res.streams[1], "bye\n");
    }

    #[tokio::test(start_paused = true)]
    async fn kill_is_terminal_and_never_restarts() {
        let script = Script::new(vec![Message::new(Level::STDOUT, "up")]).holding();
        let cmd = Command::new("test")
            .with_max_restart(5)
            .with_recurring_period(1);
        let (handle, rec, spawned) = start(script, cmd, Vec::new());

        first_message(&rec).await;
        handle.kill();
        handle.kill();

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Killed);
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn kill_lands_during_recurring_sleep() {
        let script = Script::new(vec![Message::exit(JobState::Success)]);
        let (handle, rec, spawned) =
            start(script, Command::new("test").with_recurring_period(60), Vec::new());

        first_message(&rec).await;
        handle.kill();

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Killed);
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_job_runs_again() {
        let script = Script::new(vec![Message::exit(JobState::Success)]);
        let (handle, _rec, spawned) =
            start(script, Command::new("test").with_recurring_period(5), Vec::new());

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(spawned.load(Ordering::SeqCst), 3);

        handle.kill();
        assert_eq!(handle.wait().await.unwrap().state, JobState::Killed);
    }

    #[tokio::test(start_paused = true)]
    async fn long_failing_runs_reset_the_restart_budget() {
        // each run times out after 11s, past the 10s stability window
        let cmd = Command::new("test").with_max_time(11).with_max_restart(2);
        let (factory, spawned) = Script::default().holding().factory();
        let (handle, _rec) = start_with(factory, PmConfig::default(), cmd, Vec::new());

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(spawned.load(Ordering::SeqCst), 4);

        handle.kill();
        assert_eq!(handle.wait().await.unwrap().state, JobState::Killed);
    }

    #[tokio::test(start_paused = true)]
    async fn short_failing_runs_exhaust_the_restart_budget() {
        let config = PmConfig {
            stability_window: Duration::from_secs(60),
            ..PmConfig::default()
        };
        let cmd = Command::new("test").with_max_time(11).with_max_restart(2);
        let (factory, spawned) = Script::default().holding().factory();
        let (handle, _rec) = start_with(factory, config, cmd, Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Timeout);
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recurring_success_resets_the_restart_budget() {
        let (factory, spawned) = Script::sequence(vec![
            exits(JobState::Error),
            exits(JobState::Success),
            exits(JobState::Error),
        ]);
        let cmd = Command::new("test").with_max_restart(2).with_recurring_period(5);
        let (handle, _rec) = start_with(factory, PmConfig::default(), cmd, Vec::new());

        // fail at 0s, restart succeeds at 1s, next period fails at 6s
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(spawned.load(Ordering::SeqCst), 2);

        // the success left budget for one quick restart at 7s
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(spawned.load(Ordering::SeqCst), 4);

        handle.kill();
        assert_eq!(handle.wait().await.unwrap().state, JobState::Killed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_drains_until_close() {
        let script = Script::new(vec![Message::new(Level::STDOUT, "working")]).holding();
        let (handle, _rec, spawned) = start(script, Command::new("test").with_max_time(2), Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Timeout);
        assert_eq!(res.streams[0], "working\n");
        assert!(res.time >= 2000);
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_failure_is_not_restarted() {
        let script = Script {
            fail_spawn: true,
            ..Default::default()
        };
        let (handle, _rec, spawned) =
            start(script, Command::new("test").with_max_restart(3), Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Error);
        assert!(res.streams[1].contains("no such binary"));
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn result_payload_critical_and_stats() {
        let script = Script::new(vec![
            Message::new(Level::RESULT_JSON, r#"{"ok":true}"#),
            Message::new(Level::CRITICAL, "disk full"),
            Message::new(Level::STATSD, "hits:2|c"),
            Message::exit(JobState::Success),
        ]);
        let (handle, rec, _) = start(script, Command::new("test").with_id("job-1"), Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.level, Level::RESULT_JSON);
        assert_eq!(res.data, r#"{"ok":true}"#);
        assert_eq!(res.critical, "disk full");

        let snapshots = rec.snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].get("job-1.hits"), Some(2.0));

        let messages = rec.messages.lock().unwrap();
        assert_eq!(messages.len(), 4);
        assert!(messages.iter().all(|m| m.epoch > 0));
    }

    #[tokio::test(start_paused = true)]
    async fn meter_feeds_resource_gauges() {
        let script = Script::default().holding();
        let cmd = Command::new("test").with_id("m").with_max_time(31);
        let (handle, rec, _) = start(script, cmd, Vec::new());

        let res = handle.wait().await.unwrap();
        assert_eq!(res.state, JobState::Timeout);
        assert_eq!(handle.stats().rss, 1024);

        let snapshots = rec.snapshots.lock().unwrap();
        let last = snapshots.last().unwrap();
        assert_eq!(last.get("m._cpu_"), Some(1.5));
        assert_eq!(last.get("m._rss_"), Some(1024.0));
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_fire_once_across_restarts() {
        let exits = Arc::new(AtomicUsize::new(0));
        let pids = Arc::new(AtomicUsize::new(0));
        let (e, p) = (Arc::clone(&exits), Arc::clone(&pids));

        let hooks: Vec<Arc<dyn RunnerHook>> = vec![
            Arc::new(ExitHook::new(move |ok| {
                assert!(!ok);
                e.fetch_add(1, Ordering::SeqCst);
            })),
            Arc::new(PidHook::new(move |pid| {
                assert_eq!(pid, FAKE_PID);
                p.fetch_add(1, Ordering::SeqCst);
            })),
        ];
        let script = Script::new(vec![Message::exit(JobState::Error)]);
        let (handle, _rec, spawned) =
            start(script, Command::new("test").with_max_restart(2), hooks);

        handle.wait().await.unwrap();
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(pids.load(Ordering::SeqCst), 1);
    }
}
