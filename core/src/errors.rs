//! Error types for gatekeeper

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatekeeperError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Instance already registered: {0}")]
    DuplicateInstance(String),

    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse error classification used at the boundary (CLI exit codes,
/// future transport adapters). Everything ambient maps to `Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Duplicate,
    Exhausted,
    Conflict,
    Unavailable,
    Internal,
}

impl GatekeeperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatekeeperError::Validation(_) => ErrorKind::Validation,
            GatekeeperError::NotFound(_) => ErrorKind::NotFound,
            GatekeeperError::DuplicateInstance(_) => ErrorKind::Duplicate,
            GatekeeperError::PoolExhausted(_) => ErrorKind::Exhausted,
            GatekeeperError::Conflict(_) => ErrorKind::Conflict,
            GatekeeperError::StoreUnavailable(_) => ErrorKind::Unavailable,
            GatekeeperError::Config(_) => ErrorKind::Validation,
            GatekeeperError::Io(_) | GatekeeperError::Json(_) | GatekeeperError::Yaml(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Only store failures are transient; everything else is terminal
    /// and must surface to the caller without retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatekeeperError::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;
