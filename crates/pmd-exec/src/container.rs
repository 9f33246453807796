//! Namespaced process (`core.container`).
//!
//! The child is a system process that, between fork and exec, moves into fresh UTS, mount,
//! pid and network namespaces, optionally sets its hostname and chroots into the container root.
//! `unshare(CLONE_NEWPID)` places the children of the command, not the command itself, in the
//! new pid namespace.
use std::{ffi::CString, sync::Arc};

use nix::{
    sched::{CloneFlags, unshare},
    unistd::{chdir, chroot, sethostname},
};
use serde::Deserialize;

use pmd_core::{CoreError, MessageRx, PidTable, Process, ProcessFactory};
use pmd_model::{Command, ProcessStats};

use crate::{
    error::{ExecError, ExecResult},
    system::{PreExec, SystemArgs, SystemProcess},
};

/// Arguments of a `core.container` command.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContainerArgs {
    #[serde(flatten)]
    pub process: SystemArgs,
    /// Root filesystem of the container.
    pub chroot: String,
    pub hostname: Option<String>,
}

pub struct ContainerProcess(SystemProcess);

impl ContainerProcess {
    pub fn new(table: Arc<dyn PidTable>, cmd: Arc<Command>) -> Self {
        let prepared = cmd
            .arguments::<ContainerArgs>()
            .map_err(ExecError::from)
            .and_then(prepare);
        let process = match prepared {
            Ok((args, hook)) => SystemProcess::with_args(table, cmd, Ok(args)).with_pre_exec(hook),
            Err(e) => SystemProcess::with_args(table, cmd, Err(e)),
        };
        Self(process)
    }

    pub fn factory() -> ProcessFactory {
        Arc::new(|table: Arc<dyn PidTable>, cmd: Arc<Command>| -> Box<dyn Process> {
            Box::new(ContainerProcess::new(table, cmd))
        })
    }
}

impl Process for ContainerProcess {
    fn run(&mut self) -> Result<MessageRx, CoreError> {
        self.0.run()
    }

    fn kill(&mut self) {
        self.0.kill()
    }

    fn stats(&mut self) -> ProcessStats {
        self.0.stats()
    }
}

/// Splits the container arguments into the plain process and its sandbox hook.
///
/// The working directory is entered after the chroot, so it moves into the hook.
fn prepare(args: ContainerArgs) -> ExecResult<(SystemArgs, PreExec)> {
    if args.chroot.is_empty() {
        return Err(ExecError::Spawn("container root is not set".into()));
    }
    let mut process = args.process;
    let dir = match std::mem::take(&mut process.dir) {
        dir if dir.is_empty() => "/".to_string(),
        dir => dir,
    };
    let sandbox = Sandbox {
        root: cstring(args.chroot)?,
        dir: cstring(dir)?,
        hostname: args.hostname,
    };
    Ok((process, sandbox.into_hook()))
}

fn cstring(s: String) -> ExecResult<CString> {
    CString::new(s).map_err(|e| ExecError::Spawn(e.to_string()))
}

/// Paths are prepared before the fork; the hook itself does not allocate.
struct Sandbox {
    root: CString,
    dir: CString,
    hostname: Option<String>,
}

impl Sandbox {
    fn into_hook(self) -> PreExec {
        Box::new(move || {
            unshare(
                CloneFlags::CLONE_NEWUTS
                    | CloneFlags::CLONE_NEWNS
                    | CloneFlags::CLONE_NEWPID
                    | CloneFlags::CLONE_NEWNET,
            )?;
            if let Some(name) = &self.hostname {
                sethostname(name)?;
            }
            chroot(self.root.as_c_str())?;
            chdir(self.dir.as_c_str())?;
            Ok(())
        })
    }
}
