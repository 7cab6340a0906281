//! Error types for iterator stack construction.

use gridplan_state::StateError;
use thiserror::Error;

/// Result type alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors that can occur while assembling the iterator stack. Selection
/// itself never fails — an infeasible request simply yields no node.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("candidate node enumeration failed: {0}")]
    NodeEnumeration(StateError),

    #[error("capacity projection failed: {0}")]
    Capacity(StateError),
}
