use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown command type '{0}'")]
    UnknownCommand(String),
    #[error("job '{0}' is already running")]
    DuplicateId(String),
    #[error("spawn failed: {0}")]
    Spawn(#[source] Box<dyn StdError + Send + Sync>),
    #[error("invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("process manager is closed")]
    Closed,
    #[error("process manager already started")]
    AlreadyStarted,
}

impl CoreError {
    pub fn spawn(e: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        CoreError::Spawn(e.into())
    }
}
