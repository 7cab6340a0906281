//! Feasibility half of the selection pipeline.
//!
//! These iterators produce candidate nodes lazily; each wraps its parent and
//! filters or reorders what flows through. `reset` rewinds the whole chain
//! to the top of this evaluation's candidate set.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use gridplan_state::{Constraint, Node};

use crate::context::EvalContext;

/// A lazy producer of feasible candidate nodes. The context is the borrowed
/// handle every layer of the stack shares; the predicate filters here do not
/// read it, but the contract carries it so any conforming layer can.
pub trait FeasibleIterator {
    /// The next feasible node, or `None` at end of stream.
    fn next(&mut self, ctx: &mut EvalContext) -> Option<Arc<Node>>;

    /// Rewind to the top of the candidate set.
    fn reset(&mut self);
}

// ── Random source ─────────────────────────────────────────────────

/// Source iterator over the base node set, shuffled once at construction.
///
/// The shuffle reduces collisions between schedulers working from the same
/// snapshot and spreads load off the first eligible node. The seed derives
/// from the evaluation id, so one evaluation always visits nodes in the same
/// order while distinct evaluations diverge.
pub struct RandomIterator {
    nodes: Vec<Arc<Node>>,
    offset: usize,
}

impl RandomIterator {
    pub fn new(nodes: Vec<Node>, seed: u64) -> Self {
        let mut nodes: Vec<Arc<Node>> = nodes.into_iter().map(Arc::new).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        nodes.shuffle(&mut rng);
        Self { nodes, offset: 0 }
    }

    /// Number of nodes in the base set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FeasibleIterator for RandomIterator {
    fn next(&mut self, _ctx: &mut EvalContext) -> Option<Arc<Node>> {
        let node = self.nodes.get(self.offset)?.clone();
        self.offset += 1;
        Some(node)
    }

    fn reset(&mut self) {
        self.offset = 0;
    }
}

// ── Constraint filter ─────────────────────────────────────────────

/// Filters nodes that fail any of a set of constraints. Used twice in the
/// stack: once with the job's constraints, once with the active group's.
pub struct ConstraintIterator<S> {
    source: S,
    constraints: Vec<Constraint>,
}

impl<S: FeasibleIterator> ConstraintIterator<S> {
    pub fn new(source: S, constraints: Vec<Constraint>) -> Self {
        Self {
            source,
            constraints,
        }
    }

    /// Swap the constraint set when retargeting to another task group.
    pub fn set_constraints(&mut self, constraints: Vec<Constraint>) {
        self.constraints = constraints;
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: FeasibleIterator> FeasibleIterator for ConstraintIterator<S> {
    fn next(&mut self, ctx: &mut EvalContext) -> Option<Arc<Node>> {
        loop {
            let node = self.source.next(ctx)?;
            if self.constraints.iter().all(|c| c.matches(&node)) {
                return Some(node);
            }
        }
    }

    fn reset(&mut self) {
        self.source.reset();
    }
}

// ── Driver filter ─────────────────────────────────────────────────

/// Filters nodes that do not advertise every driver kind the active task
/// group needs.
pub struct DriverIterator<S> {
    source: S,
    drivers: BTreeSet<String>,
}

impl<S: FeasibleIterator> DriverIterator<S> {
    pub fn new(source: S, drivers: BTreeSet<String>) -> Self {
        Self { source, drivers }
    }

    /// Swap the required driver set when retargeting to another task group.
    pub fn set_drivers(&mut self, drivers: BTreeSet<String>) {
        self.drivers = drivers;
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: FeasibleIterator> FeasibleIterator for DriverIterator<S> {
    fn next(&mut self, ctx: &mut EvalContext) -> Option<Arc<Node>> {
        loop {
            let node = self.source.next(ctx)?;
            if self.drivers.iter().all(|d| node.drivers.contains(d)) {
                return Some(node);
            }
        }
    }

    fn reset(&mut self) {
        self.source.reset();
    }
}
