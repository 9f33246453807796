//! OS-backed process (`core.system`).
//!
//! ```text
//!  register(spawn) ─► pid ─┬─ stdout ─► Consumer(STDOUT) ─┐
//!                          └─ stderr ─► Consumer(STDERR) ─┴─► pump ─► MessageRx
//!                                                              │ both streams at EOF
//!                                                              ▼
//!                                                     wait_pid ─► EXIT_STATE
//! ```
//!
//! ## Rules
//! - The child leads its own process group; kill signals the whole group.
//! - `EXIT_STATE` lines written by the child are demoted to `STDERR`.
//! - Internal levels are consumed here: `INTERNAL_MONITOR_PID` adds a pid to the meter.
//! - The exit state is sent only after both output streams are closed.
use std::{
    collections::HashMap,
    io,
    os::unix::process::CommandExt,
    process::{Child, Stdio},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use nix::sys::signal::Signal;
use serde::Deserialize;
use tokio::{io::AsyncWriteExt, sync::mpsc};
use tracing::{debug, info, trace, warn};

use pmd_core::{CoreError, MessageRx, Pid, PidTable, Process, ProcessFactory, stream::Consumer};
use pmd_model::{Command, JobState, Level, Message, ProcessStats};

use crate::{
    error::{ExecError, ExecResult},
    meter::Meter,
    util::{cmd_program, signal_group, signal_pid},
};

/// Capacity of the message channel of one run.
const MESSAGE_QUEUE: usize = 64;
/// Time between SIGTERM and SIGKILL on kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Hook run in the child between fork and exec.
pub(crate) type PreExec = Box<dyn FnMut() -> io::Result<()> + Send + Sync>;

/// Arguments of a `core.system` command.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemArgs {
    /// Program, resolved through `PATH` when it has no slash.
    pub name: String,
    /// Working directory; empty keeps the agent's.
    pub dir: String,
    pub args: Vec<String>,
    /// Added on top of the agent's environment.
    pub env: HashMap<String, String>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: String,
}

pub struct SystemProcess {
    cmd: Arc<Command>,
    table: Arc<dyn PidTable>,
    args: Option<ExecResult<SystemArgs>>,
    pre_exec: Option<PreExec>,
    pid: Option<Pid>,
    meter: Arc<Mutex<Meter>>,
    exited: Arc<AtomicBool>,
}

impl SystemProcess {
    pub fn new(table: Arc<dyn PidTable>, cmd: Arc<Command>) -> Self {
        let args = cmd.arguments::<SystemArgs>().map_err(ExecError::from);
        Self::with_args(table, cmd, args)
    }

    pub(crate) fn with_args(
        table: Arc<dyn PidTable>,
        cmd: Arc<Command>,
        args: ExecResult<SystemArgs>,
    ) -> Self {
        Self {
            cmd,
            table,
            args: Some(args),
            pre_exec: None,
            pid: None,
            meter: Arc::new(Mutex::new(Meter::new())),
            exited: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn with_pre_exec(mut self, hook: PreExec) -> Self {
        self.pre_exec = Some(hook);
        self
    }

    pub fn factory() -> ProcessFactory {
        Arc::new(|table: Arc<dyn PidTable>, cmd: Arc<Command>| -> Box<dyn Process> {
            Box::new(SystemProcess::new(table, cmd))
        })
    }

    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    fn spawn(&mut self) -> ExecResult<(Pid, Child, String)> {
        let args = self
            .args
            .take()
            .unwrap_or_else(|| Err(ExecError::Spawn("process already started".into())))?;
        if args.name.is_empty() {
            return Err(ExecError::MissingProgram);
        }

        let mut command = cmd_program(&args.name, &args.args);
        if !args.dir.is_empty() {
            command.current_dir(&args.dir);
        }
        command
            .envs(&args.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(hook) = self.pre_exec.take() {
            // SAFETY: the hooks installed by this crate only issue raw syscalls.
            unsafe {
                command.pre_exec(hook);
            }
        }

        let mut child = None;
        let pid = self
            .table
            .register(&mut || {
                let spawned = command.spawn()?;
                let pid = spawned.id() as Pid;
                child = Some(spawned);
                Ok(pid)
            })
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", args.name)))?;
        let child = child.ok_or_else(|| ExecError::Spawn("no child after spawn".into()))?;
        trace!(target: "pmd.exec.system", id = %self.cmd.id, program = %args.name, pid, "spawned");
        Ok((pid, child, args.stdin))
    }

    fn meter(&self) -> MutexGuard<'_, Meter> {
        lock(&self.meter)
    }
}

impl Process for SystemProcess {
    fn run(&mut self) -> Result<MessageRx, CoreError> {
        let (pid, mut child, input) = self.spawn().map_err(|e| {
            warn!(target: "pmd.exec.system", id = %self.cmd.id, error = %e, "failed to start process");
            CoreError::spawn(e)
        })?;
        self.pid = Some(pid);
        self.meter().attach(pid);

        let pipes = Pipes::take(&mut child).inspect_err(|e| {
            warn!(target: "pmd.exec.system", id = %self.cmd.id, pid, error = %e, "failed to attach pipes");
            signal_group(pid, Signal::SIGKILL);
        });
        let pipes = match pipes {
            Ok(pipes) => pipes,
            Err(e) => {
                let table = Arc::clone(&self.table);
                tokio::spawn(async move {
                    let _ = table.wait_pid(pid).await;
                });
                return Err(CoreError::spawn(e));
            }
        };

        if let Some(mut stdin) = pipes.stdin {
            if !input.is_empty() {
                let id = self.cmd.id.clone();
                tokio::spawn(async move {
                    if let Err(e) = stdin.write_all(input.as_bytes()).await {
                        warn!(target: "pmd.exec.system", %id, error = %e, "failed to write process stdin");
                    }
                });
            }
        }

        let (raw_tx, raw_rx) = mpsc::channel(MESSAGE_QUEUE);
        let out_done = Consumer::new(pipes.stdout, Level::STDOUT).consume(raw_tx.clone());
        let err_done = Consumer::new(pipes.stderr, Level::STDERR).consume(raw_tx);

        let (tx, rx) = mpsc::channel(MESSAGE_QUEUE);
        let pump = Pump {
            cmd: Arc::clone(&self.cmd),
            table: Arc::clone(&self.table),
            meter: Arc::clone(&self.meter),
            exited: Arc::clone(&self.exited),
            pid,
        };
        tokio::spawn(async move {
            pump.run(raw_rx, tx, [out_done, err_done]).await;
        });
        Ok(rx)
    }

    fn kill(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };
        if self.exited.load(Ordering::Acquire) {
            return;
        }
        debug!(target: "pmd.exec.system", id = %self.cmd.id, pid, "terminating process group");
        signal_group(pid, Signal::SIGTERM);
        for &child in self.meter().tracked() {
            signal_pid(child, Signal::SIGTERM);
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let exited = Arc::clone(&self.exited);
            handle.spawn(async move {
                tokio::time::sleep(KILL_GRACE).await;
                if !exited.load(Ordering::Acquire) {
                    warn!(target: "pmd.exec.system", pid, "process ignored SIGTERM, killing");
                    signal_group(pid, Signal::SIGKILL);
                }
            });
        }
    }

    fn stats(&mut self) -> ProcessStats {
        if self.exited.load(Ordering::Acquire) {
            return ProcessStats::default();
        }
        self.meter().sample()
    }
}

struct Pipes {
    stdin: Option<tokio::process::ChildStdin>,
    stdout: tokio::process::ChildStdout,
    stderr: tokio::process::ChildStderr,
}

impl Pipes {
    fn take(child: &mut Child) -> io::Result<Self> {
        let missing = || io::Error::other("pipe not captured");
        Ok(Self {
            stdin: child
                .stdin
                .take()
                .map(tokio::process::ChildStdin::from_std)
                .transpose()?,
            stdout: tokio::process::ChildStdout::from_std(child.stdout.take().ok_or_else(missing)?)?,
            stderr: tokio::process::ChildStderr::from_std(child.stderr.take().ok_or_else(missing)?)?,
        })
    }
}

struct Pump {
    cmd: Arc<Command>,
    table: Arc<dyn PidTable>,
    meter: Arc<Mutex<Meter>>,
    exited: Arc<AtomicBool>,
    pid: Pid,
}

impl Pump {
    async fn run(
        self,
        mut raw: mpsc::Receiver<Message>,
        tx: mpsc::Sender<Message>,
        done: [tokio::sync::oneshot::Receiver<()>; 2],
    ) {
        while let Some(mut msg) = raw.recv().await {
            if self.intercept(&mut msg) {
                let _ = tx.send(msg).await;
            }
        }
        for signal in done {
            let _ = signal.await;
        }

        let state = match self.table.wait_pid(self.pid).await {
            Ok(status) => {
                info!(
                    target: "pmd.exec.system",
                    id = %self.cmd.id, pid = self.pid, code = ?status.code, signal = ?status.signal,
                    "process exited"
                );
                if status.success() {
                    JobState::Success
                } else {
                    JobState::Error
                }
            }
            Err(e) => {
                warn!(target: "pmd.exec.system", id = %self.cmd.id, pid = self.pid, error = %e, "exit status unavailable");
                JobState::Error
            }
        };
        self.exited.store(true, Ordering::Release);
        let _ = tx.send(Message::exit(state)).await;
    }

    /// Returns `false` for messages consumed here.
    fn intercept(&self, msg: &mut Message) -> bool {
        if msg.level == Level::EXIT_STATE {
            msg.level = Level::STDERR;
        }
        if !msg.level.is_internal() {
            return true;
        }
        if msg.level == Level::INTERNAL_MONITOR_PID {
            match msg.content.trim().parse::<Pid>() {
                Ok(pid) => lock(&self.meter).track(pid),
                Err(_) => debug!(target: "pmd.exec.system", id = %self.cmd.id, content = %msg.content, "bad monitor pid"),
            }
        }
        false
    }
}

fn lock(meter: &Mutex<Meter>) -> MutexGuard<'_, Meter> {
    meter.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmd_core::PidRegistry;
    use serde_json::json;
    use tokio::time::timeout;

    fn process(args: serde_json::Value) -> SystemProcess {
        let cmd = Command::new("core.system").with_arguments(args);
        SystemProcess::new(PidRegistry::shared(), Arc::new(cmd))
    }

    fn shell(script: &str) -> SystemProcess {
        process(json!({"name": "sh", "args": ["-c", script]}))
    }

    async fn collect(mut rx: MessageRx) -> Vec<(Level, String)> {
        timeout(Duration::from_secs(10), async {
            let mut out = Vec::new();
            while let Some(msg) = rx.recv().await {
                out.push((msg.level, msg.content));
            }
            out
        })
        .await
        .expect("process stream closed in time")
    }

    fn exit(state: JobState) -> (Level, String) {
        (Level::EXIT_STATE, state.as_str().to_string())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn streams_output_then_exit_state() {
        let mut p = shell("echo hello; echo 7::careful >&2; printf '20:::{\"a\": 1}\\n:::\\n'");
        let messages = collect(p.run().unwrap()).await;

        assert!(messages.contains(&(Level::STDOUT, "hello".into())));
        assert!(messages.contains(&(Level::WARNING, "careful".into())));
        assert!(messages.contains(&(Level::RESULT_JSON, "{\"a\": 1}".into())));
        assert_eq!(messages.last(), Some(&exit(JobState::Success)));
        assert!(p.pid().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_zero_exit_is_error() {
        let mut p = shell("exit 3");
        assert_eq!(collect(p.run().unwrap()).await, vec![exit(JobState::Error)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn child_cannot_forge_exit_state() {
        let mut p = shell("echo 50::SUCCESS; exit 1");
        let messages = collect(p.run().unwrap()).await;
        assert_eq!(
            messages,
            vec![(Level::STDERR, "SUCCESS".into()), exit(JobState::Error)]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stdin_dir_and_env() {
        let mut p = process(json!({
            "name": "sh",
            "args": ["-c", "cat; pwd; echo $GREETING"],
            "dir": "/",
            "env": {"GREETING": "hi"},
            "stdin": "from stdin\n",
        }));
        let messages = collect(p.run().unwrap()).await;
        let stdout: Vec<_> = messages
            .iter()
            .filter(|(l, _)| *l == Level::STDOUT)
            .map(|(_, c)| c.as_str())
            .collect();
        assert_eq!(stdout, vec!["from stdin", "/", "hi"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn monitor_pid_is_consumed() {
        let mut p = shell("sleep 1 & echo \"101::$!\"; wait");
        let messages = collect(p.run().unwrap()).await;
        assert_eq!(messages, vec![exit(JobState::Success)]);
        assert_eq!(p.meter().tracked().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kill_terminates_the_group() {
        let mut p = shell("sleep 30 & sleep 30; wait");
        let rx = p.run().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(p.stats().rss > 0);

        p.kill();
        assert_eq!(collect(rx).await, vec![exit(JobState::Error)]);
        assert_eq!(p.stats(), ProcessStats::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_failures() {
        let mut missing = process(json!({"name": "/nonexistent/pmd-test-binary"}));
        assert!(matches!(missing.run(), Err(CoreError::Spawn(_))));

        let mut empty = process(json!({"args": ["x"]}));
        assert!(matches!(empty.run(), Err(CoreError::Spawn(_))));

        let mut invalid = process(json!({"name": 42}));
        assert!(matches!(invalid.run(), Err(CoreError::Spawn(_))));
    }
}
