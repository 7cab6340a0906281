//! The plan submission seam.
//!
//! The planner is the external arbiter serializing plans from every
//! scheduler in the cluster. It applies a plan atomically per node; when
//! another scheduler won a contended node, the result reports fewer
//! committed allocations than the plan proposed.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use gridplan_state::{Allocation, NodeId, Plan, SharedSnapshot};

/// Errors returned by a planner. Partial commits are not errors — they are
/// reported through [`PlanResult`].
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("plan submission failed: {0}")]
    Submit(String),
}

/// The outcome of an atomically applied plan: the pending allocations the
/// planner actually committed, keyed by node.
#[derive(Debug, Clone, Default)]
pub struct PlanResult {
    pub node_allocation: HashMap<NodeId, Vec<Allocation>>,
}

impl PlanResult {
    /// Compare against the submitted plan: `(fully_committed, expected,
    /// actual)`. Anything less than a full commit means other schedulers won
    /// contended nodes and the evaluation should be retried.
    pub fn full_commit(&self, plan: &Plan) -> (bool, usize, usize) {
        let expected = plan.pending_count();
        let actual: usize = self.node_allocation.values().map(Vec::len).sum();
        (actual >= expected, expected, actual)
    }
}

/// External arbiter consuming plans.
///
/// A returned snapshot means the planner refreshed its view mid-submit and
/// the scheduler should retry against the newer world; both that and a
/// partial commit are normal outcomes, not errors.
pub trait Planner: Send + Sync {
    fn submit_plan(
        &self,
        plan: &Plan,
    ) -> Result<(PlanResult, Option<SharedSnapshot>), PlannerError>;
}

/// Shared handle to a planner.
pub type SharedPlanner = Arc<dyn Planner>;

#[cfg(test)]
mod tests {
    use super::*;
    use gridplan_state::{AllocStatus, Resources};

    fn pending(name: &str, node: &str) -> Allocation {
        Allocation {
            id: format!("id-{name}"),
            name: name.to_string(),
            node_id: node.to_string(),
            job_id: "job1".to_string(),
            group_spec_hash: String::new(),
            resources: Resources::default(),
            status: AllocStatus::Pending,
        }
    }

    #[test]
    fn full_commit_when_everything_landed() {
        let mut plan = Plan::new("eval1", 50);
        plan.append_alloc(pending("job1.web[0]", "n1"));
        plan.append_alloc(pending("job1.web[1]", "n2"));

        let result = PlanResult {
            node_allocation: plan.node_allocation.clone(),
        };

        assert_eq!(result.full_commit(&plan), (true, 2, 2));
    }

    #[test]
    fn partial_commit_reports_shortfall() {
        let mut plan = Plan::new("eval1", 50);
        plan.append_alloc(pending("job1.web[0]", "n1"));
        plan.append_alloc(pending("job1.web[1]", "n2"));

        let mut committed = HashMap::new();
        committed.insert("n1".to_string(), vec![pending("job1.web[0]", "n1")]);
        let result = PlanResult {
            node_allocation: committed,
        };

        assert_eq!(result.full_commit(&plan), (false, 2, 1));
    }

    #[test]
    fn empty_plan_is_trivially_committed() {
        let plan = Plan::new("eval1", 50);
        let result = PlanResult::default();
        assert_eq!(result.full_commit(&plan), (true, 0, 0));
    }
}
