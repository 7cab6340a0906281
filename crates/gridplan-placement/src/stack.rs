//! Assembly of the full selection pipeline.

use std::collections::{BTreeSet, HashSet};

use sha2::{Digest, Sha256};
use tracing::debug;

use gridplan_state::{Constraint, Job, Node, NodeStatus, Resources};

use crate::context::EvalContext;
use crate::error::{PlacementError, PlacementResult};
use crate::feasible::{ConstraintIterator, DriverIterator, RandomIterator};
use crate::rank::{
    BinPackIterator, FeasibleRankIterator, LimitIterator, MaxScoreIterator, RankIterator,
    RankedNode,
};

/// The fully composed pipeline, feasibility below, ranking above.
type Selector = MaxScoreIterator<
    LimitIterator<
        BinPackIterator<
            FeasibleRankIterator<
                ConstraintIterator<DriverIterator<ConstraintIterator<RandomIterator>>>,
            >,
        >,
    >,
>;

/// The per-evaluation selection stack.
///
/// Built once per evaluation attempt against the current snapshot and plan,
/// then retargeted for each task group with [`IteratorStack::prepare_group`].
/// The job constraint filter sits below the group filters and never changes
/// for the lifetime of the stack.
pub struct IteratorStack {
    selector: Selector,
    base_count: usize,
    limit: usize,
}

impl IteratorStack {
    /// Enumerate the base node set (Ready nodes across the job's
    /// datacenters), prime the context's capacity table for each, and wire
    /// up the pipeline.
    pub fn new(
        ctx: &mut EvalContext,
        job: &Job,
        candidate_floor: usize,
    ) -> PlacementResult<Self> {
        let base = base_nodes(ctx, job)?;
        for node in &base {
            ctx.prime_node(node).map_err(PlacementError::Capacity)?;
        }

        let base_count = base.len();
        let limit = candidate_limit(base_count, candidate_floor);
        debug!(
            eval = %ctx.plan().eval_id,
            job = %job.id,
            base_nodes = base_count,
            limit,
            "assembled selection stack"
        );

        let source = RandomIterator::new(base, shuffle_seed(&ctx.plan().eval_id));
        let job_constraint = ConstraintIterator::new(source, job.constraints.clone());
        let group_drivers = DriverIterator::new(job_constraint, BTreeSet::new());
        let group_constraint = ConstraintIterator::new(group_drivers, Vec::new());
        let rank_source = FeasibleRankIterator::new(group_constraint);
        let bin_pack = BinPackIterator::new(rank_source, Resources::default(), job.priority);
        let bounded = LimitIterator::new(bin_pack, limit);
        let selector = MaxScoreIterator::new(bounded);

        Ok(Self {
            selector,
            base_count,
            limit,
        })
    }

    /// Retarget the stack for one task group: rewind every layer and swap in
    /// the group's driver set, constraints, and aggregated resource request.
    pub fn prepare_group(
        &mut self,
        drivers: BTreeSet<String>,
        constraints: Vec<Constraint>,
        resources: Resources,
    ) {
        self.selector.reset();
        let bin_pack = self.selector.source_mut().source_mut();
        bin_pack.set_resources(resources);
        let group_constraint = bin_pack.source_mut().source_mut();
        group_constraint.set_constraints(constraints);
        group_constraint.source_mut().set_drivers(drivers);
    }

    /// Pull the best-ranked feasible node for the prepared group, if any.
    pub fn select(&mut self, ctx: &mut EvalContext) -> Option<RankedNode> {
        self.selector.next(ctx)
    }

    /// Size of the base node set the stack was built over.
    pub fn base_count(&self) -> usize {
        self.base_count
    }

    /// Maximum number of candidates scored per selection.
    pub fn candidate_limit(&self) -> usize {
        self.limit
    }
}

/// Ready nodes across the job's datacenters, deduplicated by id.
fn base_nodes(ctx: &EvalContext, job: &Job) -> PlacementResult<Vec<Node>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for dc in &job.datacenters {
        let nodes = ctx
            .snapshot()
            .nodes_by_datacenter_status(dc, NodeStatus::Ready)
            .map_err(PlacementError::NodeEnumeration)?;
        for node in nodes {
            if seen.insert(node.id.clone()) {
                out.push(node);
            }
        }
    }
    Ok(out)
}

/// Scored candidates per selection: `max(floor, ⌈log₂ N⌉)`. Scanning a log
/// of the cluster over a random prefix is enough to find a good node without
/// visiting everything.
fn candidate_limit(base_count: usize, floor: usize) -> usize {
    if base_count == 0 {
        return floor;
    }
    let log = (base_count as f64).log2().ceil() as usize;
    log.max(floor)
}

/// Shuffle seed derived from the evaluation id: stable within one
/// evaluation, uncorrelated across evaluations.
fn shuffle_seed(eval_id: &str) -> u64 {
    let digest = Sha256::digest(eval_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
