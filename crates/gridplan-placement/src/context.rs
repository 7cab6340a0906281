//! Per-evaluation scratch state shared by the iterator stack.

use std::collections::HashMap;

use gridplan_state::{
    Allocation, Node, NodeId, Plan, Resources, SharedSnapshot, StateResult,
};

/// The single handle iterators read from during one evaluation: the active
/// snapshot, the in-progress plan, and per-node capacity projections.
///
/// The context owns the plan while placement runs; the scheduler reclaims it
/// with [`EvalContext::into_plan`] for submission. Capacity for a node is
/// primed once from the snapshot when the node enters the candidate set, so
/// lookups during ranking are infallible.
pub struct EvalContext {
    snapshot: SharedSnapshot,
    plan: Plan,
    /// Node id → resources consumed by existing non-terminal allocations,
    /// excluding allocations the plan already evicts.
    used: HashMap<NodeId, Resources>,
}

impl EvalContext {
    pub fn new(snapshot: SharedSnapshot, plan: Plan) -> Self {
        Self {
            snapshot,
            plan,
            used: HashMap::new(),
        }
    }

    /// The snapshot this evaluation is planning against.
    pub fn snapshot(&self) -> &SharedSnapshot {
        &self.snapshot
    }

    /// Compute and cache the node's existing usage from the snapshot.
    /// Allocations already marked for eviction in the plan release their
    /// capacity to this evaluation.
    pub fn prime_node(&mut self, node: &Node) -> StateResult<()> {
        if self.used.contains_key(&node.id) {
            return Ok(());
        }
        let mut used = Resources::default();
        for alloc in self.snapshot.allocs_by_node(&node.id)? {
            if alloc.status.terminal() || self.plan.evicts(&alloc.id) {
                continue;
            }
            used.add(&alloc.resources);
        }
        self.used.insert(node.id.clone(), used);
        Ok(())
    }

    /// Remaining headroom on a node: capacity minus existing usage minus
    /// everything this plan has already placed there.
    pub fn remaining_capacity(&self, node: &Node) -> Resources {
        let mut committed = self.used.get(&node.id).cloned().unwrap_or_default();
        if let Some(pending) = self.plan.node_allocation.get(&node.id) {
            for alloc in pending {
                committed.add(&alloc.resources);
            }
        }
        node.resources.saturating_sub(&committed)
    }

    /// Append a pending allocation to the plan, charging its node.
    pub fn push_allocation(&mut self, alloc: Allocation) {
        self.plan.append_alloc(alloc);
    }

    /// The in-progress plan.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Release the plan for submission.
    pub fn into_plan(self) -> Plan {
        self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_state::{AllocStatus, ClusterSnapshot, NodeStatus};
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    fn node(id: &str, cpu: u32, memory: u64) -> Node {
        Node {
            id: id.to_string(),
            datacenter: "dc1".to_string(),
            status: NodeStatus::Ready,
            resources: Resources {
                cpu_mhz: cpu,
                memory_mb: memory,
                disk_mb: 10_000,
            },
            attributes: HashMap::new(),
            drivers: BTreeSet::new(),
        }
    }

    fn alloc(id: &str, node: &str, memory: u64, status: AllocStatus) -> Allocation {
        Allocation {
            id: id.to_string(),
            name: format!("job1.web[{id}]"),
            node_id: node.to_string(),
            job_id: "job1".to_string(),
            group_spec_hash: String::new(),
            resources: Resources {
                cpu_mhz: 100,
                memory_mb: memory,
                disk_mb: 0,
            },
            status,
        }
    }

    #[test]
    fn remaining_capacity_subtracts_existing_usage() {
        let mut snap = ClusterSnapshot::new();
        snap.insert_alloc(alloc("a1", "n1", 1024, AllocStatus::Running));
        snap.insert_alloc(alloc("a2", "n1", 512, AllocStatus::Complete)); // terminal, free

        let n1 = node("n1", 4000, 4096);
        let mut ctx = EvalContext::new(Arc::new(snap), Plan::new("eval1", 50));
        ctx.prime_node(&n1).unwrap();

        let remaining = ctx.remaining_capacity(&n1);
        assert_eq!(remaining.memory_mb, 4096 - 1024);
        assert_eq!(remaining.cpu_mhz, 4000 - 100);
    }

    #[test]
    fn planned_evictions_release_capacity() {
        let mut snap = ClusterSnapshot::new();
        let victim = alloc("a1", "n1", 2048, AllocStatus::Running);
        snap.insert_alloc(victim.clone());

        let mut plan = Plan::new("eval1", 50);
        plan.append_evict(&victim);

        let n1 = node("n1", 4000, 4096);
        let mut ctx = EvalContext::new(Arc::new(snap), plan);
        ctx.prime_node(&n1).unwrap();

        assert_eq!(ctx.remaining_capacity(&n1).memory_mb, 4096);
    }

    #[test]
    fn pending_placements_are_charged() {
        let snap = ClusterSnapshot::new();
        let n1 = node("n1", 4000, 4096);
        let mut ctx = EvalContext::new(Arc::new(snap), Plan::new("eval1", 50));
        ctx.prime_node(&n1).unwrap();

        ctx.push_allocation(alloc("p1", "n1", 1024, AllocStatus::Pending));
        assert_eq!(ctx.remaining_capacity(&n1).memory_mb, 4096 - 1024);

        ctx.push_allocation(alloc("p2", "n1", 1024, AllocStatus::Pending));
        assert_eq!(ctx.remaining_capacity(&n1).memory_mb, 4096 - 2048);
    }

    #[test]
    fn priming_is_cached() {
        let mut snap = ClusterSnapshot::new();
        snap.insert_alloc(alloc("a1", "n1", 1024, AllocStatus::Running));

        let n1 = node("n1", 4000, 4096);
        let mut ctx = EvalContext::new(Arc::new(snap), Plan::new("eval1", 50));
        ctx.prime_node(&n1).unwrap();
        ctx.prime_node(&n1).unwrap();

        assert_eq!(ctx.remaining_capacity(&n1).memory_mb, 3072);
    }
}
