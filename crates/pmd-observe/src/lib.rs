mod logger;
pub use logger::*;

mod job;
pub use job::{level_for, log_message, log_result, message_for};
#[cfg(feature = "subscriber")]
pub use job::Console;
