//! Runtime error types.

use crate::config::ConfigError;
use fsmkit_core::CoreError;
use thiserror::Error;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("table already registered: {0}")]
    TableExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("subject already exists: {0}")]
    SubjectExists(String),

    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("{0}: target not accepting events")]
    NotAccepting(String),

    #[error("{0}: event queue full")]
    QueueFull(String),

    #[error("{0}: completion callbacks require a queued subject")]
    NotQueued(String),

    #[error("queued dispatch requires a running tokio runtime")]
    NoAsyncRuntime,

    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Returns a stable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuntimeError::Core(e) => e.error_code(),
            RuntimeError::TableExists(_) => "TABLE_EXISTS",
            RuntimeError::TableNotFound(_) => "TABLE_NOT_FOUND",
            RuntimeError::SubjectExists(_) => "SUBJECT_EXISTS",
            RuntimeError::SubjectNotFound(_) => "SUBJECT_NOT_FOUND",
            RuntimeError::NotAccepting(_) => "NOT_ACCEPTING",
            RuntimeError::QueueFull(_) => "QUEUE_FULL",
            RuntimeError::NotQueued(_) => "NOT_QUEUED",
            RuntimeError::NoAsyncRuntime => "NO_ASYNC_RUNTIME",
            RuntimeError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Returns whether the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RuntimeError::QueueFull(_))
    }
}
