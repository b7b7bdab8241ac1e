use thiserror::Error;

use crate::subsystem::Subsystem;

#[derive(Error, Debug)]
pub enum DiagError {
    #[error("Connection error: {0}")]
    Connection(#[source] anyhow::Error),

    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(std::time::Duration),

    #[error("Malformed {subsystem} response: {field}")]
    MalformedResponse { subsystem: Subsystem, field: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type DiagResult<T> = Result<T, DiagError>;
