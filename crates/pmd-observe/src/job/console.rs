use pmd_core::ProcessManager;

use super::{log_message, log_result};

/// Renders every job message and result through `tracing`.
pub struct Console;

impl Console {
    pub fn attach(pm: &ProcessManager) {
        pm.add_message_handler(log_message);
        pm.add_result_handler(log_result);
    }
}
