use std::{collections::HashMap, sync::Arc};

use pmd_model::{Command, JobResult, Message, Route};
use pmd_stats::FlushHandler;

/// Receives every message that passes the command's log filter.
pub type MessageHandler = Arc<dyn Fn(&Command, &Message) + Send + Sync>;

/// Receives the final result of every job.
pub type ResultHandler = Arc<dyn Fn(&Command, &JobResult) + Send + Sync>;

#[derive(Default)]
pub(super) struct Handlers {
    pub(super) message: Vec<MessageHandler>,
    pub(super) result: Vec<ResultHandler>,
    pub(super) route: HashMap<Route, Vec<ResultHandler>>,
    pub(super) stats: Vec<FlushHandler>,
}

impl Handlers {
    /// Global handlers first, then the ones registered for the command's route.
    pub(super) fn for_result(&self, cmd: &Command) -> Vec<ResultHandler> {
        let mut out = self.result.clone();
        if let Some(routed) = self.route.get(&cmd.route) {
            out.extend(routed.iter().cloned());
        }
        out
    }

    pub(super) fn for_stats(&self) -> Vec<FlushHandler> {
        self.stats.clone()
    }

    pub(super) fn for_message(&self) -> Vec<MessageHandler> {
        self.message.clone()
    }
}
