use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid device identity: {0}")]
    InvalidIdentity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
