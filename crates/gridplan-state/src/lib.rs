//! gridplan-state — domain model and cluster snapshot interface.
//!
//! Defines the types the scheduler reasons over (jobs, task groups, nodes,
//! allocations, evaluations, plans) and the [`StateSnapshot`] trait through
//! which the scheduler reads a point-in-time view of the cluster.
//!
//! The scheduler owns no persistent state: everything it reads comes through
//! a snapshot, and everything it writes goes into a [`Plan`] consumed by the
//! external planner. Snapshots are immutable and replaced wholesale when the
//! planner hands back a newer view.

pub mod error;
pub mod snapshot;
pub mod types;

pub use error::{StateError, StateResult};
pub use snapshot::{ClusterSnapshot, SharedSnapshot, StateSnapshot};
pub use types::*;
