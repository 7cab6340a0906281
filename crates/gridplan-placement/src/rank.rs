//! Ranking half of the selection pipeline.
//!
//! [`FeasibleRankIterator`] lifts feasible nodes into scored tuples; the
//! iterators above it score, bound, and select. Scores are comparable only
//! within one evaluation.

use std::sync::Arc;

use gridplan_state::{Node, Resources};

use crate::context::EvalContext;
use crate::feasible::FeasibleIterator;

/// A candidate node with its placement score (higher is better).
#[derive(Debug, Clone)]
pub struct RankedNode {
    pub node: Arc<Node>,
    pub score: f64,
}

/// A lazy producer of scored candidate nodes.
pub trait RankIterator {
    /// The next ranked node, or `None` at end of stream. Capacity reads go
    /// through the context, never through sibling iterators.
    fn next(&mut self, ctx: &mut EvalContext) -> Option<RankedNode>;

    /// Rewind to the top of the candidate set.
    fn reset(&mut self);
}

// ── Feasibility → rank boundary ───────────────────────────────────

/// Adapter promoting feasible nodes into ranked tuples with score zero.
pub struct FeasibleRankIterator<S> {
    source: S,
}

impl<S: FeasibleIterator> FeasibleRankIterator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: FeasibleIterator> RankIterator for FeasibleRankIterator<S> {
    fn next(&mut self, ctx: &mut EvalContext) -> Option<RankedNode> {
        let node = self.source.next(ctx)?;
        Some(RankedNode { node, score: 0.0 })
    }

    fn reset(&mut self) {
        self.source.reset();
    }
}

// ── Bin-packing score ─────────────────────────────────────────────

/// Scores nodes by how tightly the requested resources fit into remaining
/// capacity; nodes that would overflow in any dimension are dropped.
///
/// The score is the mean projected utilization across dimensions on a 0–100
/// scale, boosted by the job's priority so higher-priority work packs more
/// aggressively when the planner arbitrates.
pub struct BinPackIterator<S> {
    source: S,
    resources: Resources,
    priority: u32,
}

impl<S: RankIterator> BinPackIterator<S> {
    pub fn new(source: S, resources: Resources, priority: u32) -> Self {
        Self {
            source,
            resources,
            priority,
        }
    }

    /// Swap the resource request when retargeting to another task group.
    pub fn set_resources(&mut self, resources: Resources) {
        self.resources = resources;
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn score(&self, node: &Node, remaining: &Resources) -> Option<f64> {
        if !remaining.superset_of(&self.resources) {
            return None;
        }

        // Projected utilization per dimension after placing; dimensions the
        // node does not advertise are skipped.
        let mut fitness = 0.0;
        let mut dims = 0u32;
        if node.resources.cpu_mhz > 0 {
            let projected = node.resources.cpu_mhz - remaining.cpu_mhz + self.resources.cpu_mhz;
            fitness += f64::from(projected) / f64::from(node.resources.cpu_mhz);
            dims += 1;
        }
        if node.resources.memory_mb > 0 {
            let projected =
                node.resources.memory_mb - remaining.memory_mb + self.resources.memory_mb;
            fitness += projected as f64 / node.resources.memory_mb as f64;
            dims += 1;
        }
        if node.resources.disk_mb > 0 {
            let projected = node.resources.disk_mb - remaining.disk_mb + self.resources.disk_mb;
            fitness += projected as f64 / node.resources.disk_mb as f64;
            dims += 1;
        }
        if dims == 0 {
            return None;
        }

        let utilization = fitness / f64::from(dims);
        let priority_weight = 1.0 + f64::from(self.priority) / 100.0;
        Some(utilization * 100.0 * priority_weight)
    }
}

impl<S: RankIterator> RankIterator for BinPackIterator<S> {
    fn next(&mut self, ctx: &mut EvalContext) -> Option<RankedNode> {
        loop {
            let candidate = self.source.next(ctx)?;
            let remaining = ctx.remaining_capacity(&candidate.node);
            if let Some(score) = self.score(&candidate.node, &remaining) {
                return Some(RankedNode {
                    node: candidate.node,
                    score,
                });
            }
        }
    }

    fn reset(&mut self) {
        self.source.reset();
    }
}

// ── Exploration bound ─────────────────────────────────────────────

/// Emits at most `limit` candidates per pass. Together with the random
/// source prefix this caps scoring work at a small unbiased sample instead
/// of visiting every node in the cluster.
pub struct LimitIterator<S> {
    source: S,
    limit: usize,
    emitted: usize,
}

impl<S: RankIterator> LimitIterator<S> {
    pub fn new(source: S, limit: usize) -> Self {
        Self {
            source,
            limit,
            emitted: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: RankIterator> RankIterator for LimitIterator<S> {
    fn next(&mut self, ctx: &mut EvalContext) -> Option<RankedNode> {
        if self.emitted >= self.limit {
            return None;
        }
        let candidate = self.source.next(ctx)?;
        self.emitted += 1;
        Some(candidate)
    }

    fn reset(&mut self) {
        self.source.reset();
        self.emitted = 0;
    }
}

// ── Selection ─────────────────────────────────────────────────────

/// Drains its upstream and returns the best-scoring candidate exactly once;
/// further calls yield `None` until reset. First seen wins ties.
pub struct MaxScoreIterator<S> {
    source: S,
    consumed: bool,
}

impl<S: RankIterator> MaxScoreIterator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            consumed: false,
        }
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: RankIterator> RankIterator for MaxScoreIterator<S> {
    fn next(&mut self, ctx: &mut EvalContext) -> Option<RankedNode> {
        if self.consumed {
            return None;
        }
        self.consumed = true;

        let mut best: Option<RankedNode> = None;
        while let Some(candidate) = self.source.next(ctx) {
            match &best {
                Some(current) if candidate.score <= current.score => {}
                _ => best = Some(candidate),
            }
        }
        best
    }

    fn reset(&mut self) {
        self.source.reset();
        self.consumed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_state::{ClusterSnapshot, NodeStatus, Plan};
    use std::collections::{BTreeSet, HashMap};

    fn empty_ctx() -> EvalContext {
        EvalContext::new(
            Arc::new(ClusterSnapshot::new()),
            Plan::new("eval1", 50),
        )
    }

    fn node(id: &str, cpu: u32, memory: u64) -> Node {
        Node {
            id: id.to_string(),
            datacenter: "dc1".to_string(),
            status: NodeStatus::Ready,
            resources: Resources {
                cpu_mhz: cpu,
                memory_mb: memory,
                disk_mb: 0,
            },
            attributes: HashMap::new(),
            drivers: BTreeSet::new(),
        }
    }

    /// Fixed-order rank source for testing the ranking iterators alone.
    struct StaticRank {
        items: Vec<RankedNode>,
        offset: usize,
    }

    impl StaticRank {
        fn new(items: Vec<(Node, f64)>) -> Self {
            Self {
                items: items
                    .into_iter()
                    .map(|(node, score)| RankedNode {
                        node: Arc::new(node),
                        score,
                    })
                    .collect(),
                offset: 0,
            }
        }
    }

    impl RankIterator for StaticRank {
        fn next(&mut self, _ctx: &mut EvalContext) -> Option<RankedNode> {
            let item = self.items.get(self.offset)?.clone();
            self.offset += 1;
            Some(item)
        }

        fn reset(&mut self) {
            self.offset = 0;
        }
    }

    #[test]
    fn binpack_drops_nodes_that_overflow() {
        let mut ctx = empty_ctx();
        let source = StaticRank::new(vec![(node("small", 100, 100), 0.0)]);
        let mut binpack = BinPackIterator::new(
            source,
            Resources {
                cpu_mhz: 200,
                memory_mb: 50,
                disk_mb: 0,
            },
            50,
        );

        assert!(binpack.next(&mut ctx).is_none());
    }

    #[test]
    fn binpack_prefers_the_tighter_fit() {
        let mut ctx = empty_ctx();
        // Same request on a small node yields higher utilization → higher score.
        let request = Resources {
            cpu_mhz: 500,
            memory_mb: 512,
            disk_mb: 0,
        };

        let source = StaticRank::new(vec![
            (node("roomy", 4000, 8192), 0.0),
            (node("snug", 1000, 1024), 0.0),
        ]);
        let mut binpack = BinPackIterator::new(source, request, 50);

        let roomy = binpack.next(&mut ctx).unwrap();
        let snug = binpack.next(&mut ctx).unwrap();
        assert!(
            snug.score > roomy.score,
            "tight fit ({}) should outscore loose fit ({})",
            snug.score,
            roomy.score
        );
    }

    #[test]
    fn binpack_priority_boosts_score() {
        let mut ctx = empty_ctx();
        let request = Resources {
            cpu_mhz: 500,
            memory_mb: 512,
            disk_mb: 0,
        };

        let mut low = BinPackIterator::new(
            StaticRank::new(vec![(node("n1", 1000, 1024), 0.0)]),
            request.clone(),
            10,
        );
        let mut high = BinPackIterator::new(
            StaticRank::new(vec![(node("n1", 1000, 1024), 0.0)]),
            request,
            90,
        );

        assert!(high.next(&mut ctx).unwrap().score > low.next(&mut ctx).unwrap().score);
    }

    #[test]
    fn binpack_accounts_for_context_usage() {
        let request = Resources {
            cpu_mhz: 0,
            memory_mb: 600,
            disk_mb: 0,
        };
        let n1 = node("n1", 0, 1024);

        let mut ctx = empty_ctx();
        ctx.prime_node(&n1).unwrap();
        ctx.push_allocation(gridplan_state::Allocation {
            id: "p1".to_string(),
            name: "job1.web[0]".to_string(),
            node_id: "n1".to_string(),
            job_id: "job1".to_string(),
            group_spec_hash: String::new(),
            resources: Resources {
                cpu_mhz: 0,
                memory_mb: 600,
                disk_mb: 0,
            },
            status: gridplan_state::AllocStatus::Pending,
        });

        // 600 already planned on a 1024 node: a second 600 no longer fits.
        let mut binpack =
            BinPackIterator::new(StaticRank::new(vec![(n1, 0.0)]), request, 50);
        assert!(binpack.next(&mut ctx).is_none());
    }

    #[test]
    fn limit_bounds_emission_and_resets() {
        let mut ctx = empty_ctx();
        let items: Vec<(Node, f64)> = (0..10)
            .map(|i| (node(&format!("n{i}"), 1000, 1024), f64::from(i)))
            .collect();
        let mut limit = LimitIterator::new(StaticRank::new(items), 3);

        let mut count = 0;
        while limit.next(&mut ctx).is_some() {
            count += 1;
        }
        assert_eq!(count, 3);

        limit.reset();
        assert!(limit.next(&mut ctx).is_some());
    }

    #[test]
    fn max_score_returns_best_exactly_once() {
        let mut ctx = empty_ctx();
        let source = StaticRank::new(vec![
            (node("n1", 1, 1), 10.0),
            (node("n2", 1, 1), 30.0),
            (node("n3", 1, 1), 20.0),
        ]);
        let mut max = MaxScoreIterator::new(source);

        let best = max.next(&mut ctx).unwrap();
        assert_eq!(best.node.id, "n2");
        assert!(max.next(&mut ctx).is_none(), "second pull must be empty until reset");

        max.reset();
        assert_eq!(max.next(&mut ctx).unwrap().node.id, "n2");
    }

    #[test]
    fn max_score_tie_break_is_first_seen() {
        let mut ctx = empty_ctx();
        let source = StaticRank::new(vec![
            (node("first", 1, 1), 25.0),
            (node("second", 1, 1), 25.0),
        ]);
        let mut max = MaxScoreIterator::new(source);

        assert_eq!(max.next(&mut ctx).unwrap().node.id, "first");
    }

    #[test]
    fn max_score_on_empty_stream_is_none() {
        let mut ctx = empty_ctx();
        let mut max = MaxScoreIterator::new(StaticRank::new(Vec::new()));
        assert!(max.next(&mut ctx).is_none());
    }
}
