//! gridplan-placement — node selection for service placements.
//!
//! A placement request flows through a chain of lazy node producers, each
//! wrapping its parent:
//!
//! ```text
//! Random(base nodes)
//!   → Constraint(job)
//!     → Driver(group)          ← reparameterized per task group
//!       → Constraint(group)    ← reparameterized per task group
//!         → FeasibleRank       ← feasibility → ranking boundary
//!           → BinPack          ← scores by fit, drops overflow
//!             → Limit(k)       ← bounds exploration to O(log N)
//!               → MaxScore     ← consumes upstream, yields the best
//! ```
//!
//! The first half establishes feasibility, the second half ranks. The whole
//! stack is built once per evaluation attempt and retargeted per task group;
//! every iterator reads shared scratch state (the in-progress plan and the
//! per-node capacity projections) through the [`EvalContext`] only.

pub mod context;
pub mod error;
pub mod feasible;
pub mod rank;
pub mod stack;

pub use context::EvalContext;
pub use error::{PlacementError, PlacementResult};
pub use feasible::{ConstraintIterator, DriverIterator, FeasibleIterator, RandomIterator};
pub use rank::{
    BinPackIterator, FeasibleRankIterator, LimitIterator, MaxScoreIterator, RankIterator,
    RankedNode,
};
pub use stack::IteratorStack;
