//! Notation error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading a table description.
///
/// Problems inside the text are reported as diagnostics, not errors.
#[derive(Debug, Error)]
pub enum NotationError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NotationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            NotationError::Io { .. } => "IO_ERROR",
        }
    }
}
