//! Error types for cluster state access.

use thiserror::Error;

/// Result type alias for snapshot operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading a state snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("snapshot read failed: {0}")]
    Read(String),
}
