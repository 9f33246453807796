//! Commands backed by a fixed executable.
//!
//! An extension maps a command type onto a program whose argument list is a template over the
//! command's argument object: `{key}` is replaced by the value of `key`. The `stdin` key is
//! not substituted; its value is written to the program's stdin.
use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use pmd_core::{PidTable, Process, ProcessFactory};
use pmd_model::Command;

use crate::{SystemArgs, SystemProcess, util::format_template};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Extension {
    pub exe: String,
    pub cwd: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Extension {
    pub fn new(exe: impl Into<String>) -> Self {
        Self {
            exe: exe.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn factory(self) -> ProcessFactory {
        let ext = Arc::new(self);
        Arc::new(move |table: Arc<dyn PidTable>, cmd: Arc<Command>| -> Box<dyn Process> {
            let args = ext.system_args(&cmd);
            Box::new(SystemProcess::with_args(table, cmd, Ok(args)))
        })
    }

    /// Expands the templates against `cmd`'s arguments.
    pub fn system_args(&self, cmd: &Command) -> SystemArgs {
        let mut input = match &cmd.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                warn!(target: "pmd.exec.extension", id = %cmd.id, arguments = %other, "extension arguments must be an object");
                Map::new()
            }
        };
        let stdin = match input.remove("stdin") {
            Some(Value::String(s)) => s,
            Some(other) => {
                warn!(target: "pmd.exec.extension", id = %cmd.id, stdin = %other, "extension stdin must be a string");
                String::new()
            }
            None => String::new(),
        };

        let args: Vec<String> = self.args.iter().map(|a| format_template(a, &input)).collect();
        debug!(target: "pmd.exec.extension", id = %cmd.id, exe = %self.exe, ?args, "expanded extension");
        SystemArgs {
            name: self.exe.clone(),
            dir: self.cwd.clone(),
            args,
            env: self.env.clone(),
            stdin,
        }
    }
}
