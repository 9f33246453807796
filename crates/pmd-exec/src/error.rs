use pmd_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] ModelError),
    #[error("missing program")]
    MissingProgram,
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("no running job '{0}'")]
    UnknownJob(String),
    #[error("{0}")]
    Builtin(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
