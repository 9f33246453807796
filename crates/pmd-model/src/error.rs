use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid command payload: {0}")]
    InvalidCommand(#[source] serde_json::Error),
    #[error("invalid arguments for '{command}': {source}")]
    InvalidArguments {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown job state: {0}")]
    UnknownState(String),
}
