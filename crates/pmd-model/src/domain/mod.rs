mod command;
pub use command::{Command, Route};

mod message;
pub use message::Message;

mod result;
pub use result::JobResult;

mod stats;
pub use stats::ProcessStats;
