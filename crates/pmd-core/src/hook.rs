//! Runner hooks.
//!
//! A hook observes a runner from the outside: elapsed time, messages, pids and exits.
//! The provided hooks fire their action at most once, however many events could trigger it.
use std::{sync::Once, time::Duration};

use regex::Regex;

use pmd_model::{JobState, Message};

use crate::{CoreError, Pid};

pub trait RunnerHook: Send + Sync {
    fn tick(&self, _elapsed: Duration) {}
    fn message(&self, _msg: &Message) {}
    fn exit(&self, _state: JobState) {}
    fn pid(&self, _pid: Pid) {}
}

/// Fires once the run has lasted longer than `delay`.
pub struct DelayHook {
    delay: Duration,
    action: Box<dyn Fn() + Send + Sync>,
    once: Once,
}

impl DelayHook {
    pub fn new(delay: Duration, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            delay,
            action: Box::new(action),
            once: Once::new(),
        }
    }
}

impl RunnerHook for DelayHook {
    fn tick(&self, elapsed: Duration) {
        if elapsed > self.delay {
            self.once.call_once(|| (self.action)());
        }
    }
}

/// Fires on the first exit with `true` for success.
pub struct ExitHook {
    action: Box<dyn Fn(bool) + Send + Sync>,
    once: Once,
}

impl ExitHook {
    pub fn new(action: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self {
            action: Box::new(action),
            once: Once::new(),
        }
    }
}

impl RunnerHook for ExitHook {
    fn exit(&self, state: JobState) {
        self.once.call_once(|| (self.action)(state.is_success()));
    }
}

/// Fires with the first pid spawned for the runner.
pub struct PidHook {
    action: Box<dyn Fn(Pid) + Send + Sync>,
    once: Once,
}

impl PidHook {
    pub fn new(action: impl Fn(Pid) + Send + Sync + 'static) -> Self {
        Self {
            action: Box::new(action),
            once: Once::new(),
        }
    }
}

impl RunnerHook for PidHook {
    fn pid(&self, pid: Pid) {
        self.once.call_once(|| (self.action)(pid));
    }
}

/// Fires on the first message whose content matches `pattern`.
pub struct MatchHook {
    pattern: Regex,
    action: Box<dyn Fn() + Send + Sync>,
    once: Once,
}

impl MatchHook {
    pub fn new(pattern: &str, action: impl Fn() + Send + Sync + 'static) -> Result<Self, CoreError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            action: Box::new(action),
            once: Once::new(),
        })
    }
}

impl RunnerHook for MatchHook {
    fn message(&self, msg: &Message) {
        if self.pattern.is_match(&msg.content) {
            self.once.call_once(|| (self.action)());
        }
    }
}
