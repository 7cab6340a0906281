//! gridplan-scheduler — evaluation processing for service jobs.
//!
//! The scheduler consumes one [`Evaluation`](gridplan_state::Evaluation) at
//! a time: it reads the target job and its allocations from a state
//! snapshot, diffs desired against observed state, selects nodes for the
//! missing instances through the placement stack, and submits the resulting
//! plan to the external planner. Conflicts with concurrent schedulers
//! surface only at submission and are absorbed by a bounded retry loop.
//!
//! # Components
//!
//! - **`diff`** — materializes desired allocation names and partitions them
//!   into place / update / evict / ignore
//! - **`planner`** — the submission seam and commit result
//! - **`scheduler`** — the trigger dispatcher and the register/deregister
//!   handlers

pub mod diff;
pub mod error;
pub mod planner;
pub mod scheduler;

pub use diff::{diff_allocs, index_allocs, materialize_task_groups, AllocDiff};
pub use error::{SchedulerError, SchedulerResult};
pub use planner::{PlanResult, Planner, PlannerError, SharedPlanner};
pub use scheduler::{SchedulerConfig, ServiceScheduler};
