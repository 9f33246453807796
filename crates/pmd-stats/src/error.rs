use thiserror::Error;

use crate::Kind;

#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("malformed sample '{0}' (expected key:value|type)")]
    Malformed(String),
    #[error("unknown sample type '{0}'")]
    UnknownKind(String),
    #[error("invalid value '{value}' for key '{key}'")]
    InvalidValue { key: String, value: String },
    #[error("inconsistent sample for '{key}': aggregated as {existing}, got {got}")]
    Inconsistent { key: String, existing: Kind, got: Kind },
}
