//! Core error types.

use thiserror::Error;

/// Configuration errors raised while building tables or binding subjects.
///
/// Dispatch outcomes (ignored events, guard refusals, rejected events) are not
/// errors; see [`crate::engine::Outcome`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("state already exists: '{state}' in table {class_id}")]
    DuplicateState { class_id: String, state: String },

    #[error("reserved state name: '{name}'")]
    ReservedStateName { name: String },

    #[error("invalid state name: '{name}'")]
    InvalidStateName { name: String },

    #[error("invalid event name: '{name}'")]
    InvalidEventName { name: String },

    #[error("unknown state id {index} in table {class_id}")]
    UnknownState { class_id: String, index: usize },

    #[error("duplicate transition from '{state}' on event '{event}'")]
    DuplicateTransition { state: String, event: String },

    #[error("class mismatch: table '{table}' cannot drive subject of class '{subject}'")]
    ClassMismatch { table: String, subject: String },
}

impl CoreError {
    /// Returns an error code suitable for front-end display.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::DuplicateState { .. } => "DUPLICATE_STATE",
            CoreError::ReservedStateName { .. } => "RESERVED_STATE_NAME",
            CoreError::InvalidStateName { .. } => "BAD_REQUEST",
            CoreError::InvalidEventName { .. } => "BAD_REQUEST",
            CoreError::UnknownState { .. } => "STATE_NOT_FOUND",
            CoreError::DuplicateTransition { .. } => "DUPLICATE_TRANSITION",
            CoreError::ClassMismatch { .. } => "CLASS_MISMATCH",
        }
    }
}
