//! Point-in-time cluster view consumed by the scheduler.
//!
//! A [`StateSnapshot`] answers every read from the same consistent point in
//! time. The scheduler never mutates a snapshot; when the planner returns a
//! newer view the old one is dropped wholesale.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::StateResult;
use crate::types::{Allocation, Job, Node, NodeStatus};

/// Read-only, internally consistent view of jobs, nodes, and allocations.
///
/// Implementations may be backed by anything (an in-memory materialization,
/// a store snapshot); all methods must answer from the same instant.
pub trait StateSnapshot: Send + Sync {
    /// Look up a job by id.
    fn job_by_id(&self, id: &str) -> StateResult<Option<Job>>;

    /// All allocations belonging to a job, any status.
    fn allocs_by_job(&self, job_id: &str) -> StateResult<Vec<Allocation>>;

    /// All allocations bound to a node, any status. Used for remaining
    /// capacity projections during planning.
    fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>>;

    /// Nodes in a datacenter with the given status.
    fn nodes_by_datacenter_status(
        &self,
        datacenter: &str,
        status: NodeStatus,
    ) -> StateResult<Box<dyn Iterator<Item = Node> + '_>>;
}

/// Shared handle to a snapshot; replaced wholesale on refresh.
pub type SharedSnapshot = Arc<dyn StateSnapshot>;

/// In-memory snapshot over materialized cluster state.
///
/// The canonical implementation for tests and for embedders that already
/// hold a full view of the cluster.
#[derive(Debug, Default, Clone)]
pub struct ClusterSnapshot {
    jobs: HashMap<String, Job>,
    nodes: Vec<Node>,
    allocs: Vec<Allocation>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a job.
    pub fn insert_job(&mut self, job: Job) {
        debug!(job = %job.id, groups = job.task_groups.len(), "snapshot job added");
        self.jobs.insert(job.id.clone(), job);
    }

    /// Add a node.
    pub fn insert_node(&mut self, node: Node) {
        debug!(node = %node.id, datacenter = %node.datacenter, "snapshot node added");
        self.nodes.push(node);
    }

    /// Add an allocation.
    pub fn insert_alloc(&mut self, alloc: Allocation) {
        self.allocs.push(alloc);
    }
}

impl StateSnapshot for ClusterSnapshot {
    fn job_by_id(&self, id: &str) -> StateResult<Option<Job>> {
        Ok(self.jobs.get(id).cloned())
    }

    fn allocs_by_job(&self, job_id: &str) -> StateResult<Vec<Allocation>> {
        Ok(self
            .allocs
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }

    fn allocs_by_node(&self, node_id: &str) -> StateResult<Vec<Allocation>> {
        Ok(self
            .allocs
            .iter()
            .filter(|a| a.node_id == node_id)
            .cloned()
            .collect())
    }

    fn nodes_by_datacenter_status(
        &self,
        datacenter: &str,
        status: NodeStatus,
    ) -> StateResult<Box<dyn Iterator<Item = Node> + '_>> {
        let datacenter = datacenter.to_string();
        Ok(Box::new(
            self.nodes
                .iter()
                .filter(move |n| n.datacenter == datacenter && n.status == status)
                .cloned(),
        ))
    }
}
