//! Scheduler error types.

use gridplan_placement::PlacementError;
use gridplan_state::{StateError, TriggerReason};
use thiserror::Error;

use crate::planner::PlannerError;

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Fatal outcomes of processing one evaluation. Partial commits and
/// snapshot refreshes are retried internally and never surface here; a
/// missing job, an empty job, and an empty diff are success paths.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("service scheduler cannot handle '{0}' evaluation trigger")]
    UnsupportedTrigger(TriggerReason),

    #[error("snapshot read failed: {0}")]
    SnapshotRead(#[from] StateError),

    #[error("failed to build selection stack: {0}")]
    StackBuild(#[from] PlacementError),

    #[error("plan submission failed: {0}")]
    PlanSubmit(#[from] PlannerError),

    #[error("maximum schedule attempts reached ({0})")]
    ExhaustedAttempts(u32),
}
