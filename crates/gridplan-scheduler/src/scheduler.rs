//! The service scheduler: dispatch, placement, and the optimistic
//! plan-submission loop.
//!
//! Service jobs are long-lived, so the scheduler spends its time making a
//! high-quality placement rather than a fast one. It is read-only against
//! the snapshot; every conflict with a concurrent scheduler surfaces at
//! plan submission and is absorbed by restarting the attempt against
//! whichever view the planner hands back.

use std::collections::BTreeSet;

use tracing::debug;
use uuid::Uuid;

use gridplan_placement::{EvalContext, IteratorStack};
use gridplan_state::{
    AllocStatus, Allocation, Evaluation, Plan, Resources, SharedSnapshot, TaskGroup,
    TriggerReason,
};

use crate::diff::{diff_allocs, index_allocs, materialize_task_groups};
use crate::error::{SchedulerError, SchedulerResult};
use crate::planner::SharedPlanner;

/// Tunables for the service scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Attempts before a register evaluation gives up under contention.
    pub max_attempts: u32,
    /// Minimum number of candidates scored per placement.
    pub candidate_floor: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            candidate_floor: 2,
        }
    }
}

/// Scheduler for `service` type jobs — the primary scheduler for most
/// workloads. One instance processes one evaluation at a time; instances
/// running in parallel coordinate only through the planner.
pub struct ServiceScheduler {
    state: SharedSnapshot,
    planner: SharedPlanner,
    config: SchedulerConfig,
}

impl ServiceScheduler {
    /// Bind a scheduler to a state snapshot and a planner.
    pub fn new(state: SharedSnapshot, planner: SharedPlanner) -> Self {
        Self::with_config(state, planner, SchedulerConfig::default())
    }

    pub fn with_config(
        state: SharedSnapshot,
        planner: SharedPlanner,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            state,
            planner,
            config,
        }
    }

    /// Handle a single evaluation, routing on its trigger reason.
    pub fn process(&mut self, eval: &Evaluation) -> SchedulerResult<()> {
        match eval.triggered_by {
            TriggerReason::JobRegister => self.handle_job_register(eval),
            TriggerReason::JobDeregister => self.evict_job_allocs(eval),
            // Node reconciliation is handled elsewhere for now.
            TriggerReason::NodeUpdate => Ok(()),
            other => Err(SchedulerError::UnsupportedTrigger(other)),
        }
    }

    /// Handle a job being registered or updated: an optimistic try-commit
    /// loop, bounded because every retry implies another scheduler is making
    /// progress against the same nodes.
    fn handle_job_register(&mut self, eval: &Evaluation) -> SchedulerResult<()> {
        for _attempt in 0..self.config.max_attempts {
            // If the job is missing, maybe a concurrent deregister.
            let Some(job) = self.state.job_by_id(&eval.job_id)? else {
                debug!(eval = %eval.id, job = %eval.job_id, "job not found, skipping eval");
                return Ok(());
            };

            // If there is nothing required for this job, treat like a
            // deregister.
            let groups = materialize_task_groups(&job);
            if groups.is_empty() {
                return self.evict_job_allocs(eval);
            }

            let existing = index_allocs(self.state.allocs_by_job(&eval.job_id)?);
            let diff = diff_allocs(&groups, &existing);
            debug!(
                eval = %eval.id,
                job = %eval.job_id,
                placements = diff.place.len(),
                updates = diff.update.len(),
                evictions = diff.evict.len(),
                ignored = diff.ignore.len(),
                "reconciled job"
            );

            if diff.is_noop() {
                return Ok(());
            }

            let mut plan = Plan::new(&eval.id, job.priority);

            // Updates are modeled as an evict plus a fresh placement until
            // rolling in-place updates exist.
            for name in diff.evict.iter().chain(diff.update.iter()) {
                if let Some(alloc) = existing.get(name) {
                    plan.append_evict(alloc);
                }
            }
            let mut place = diff.place;
            place.extend(diff.update);

            let mut ctx = EvalContext::new(self.state.clone(), plan);
            let mut stack = IteratorStack::new(&mut ctx, &job, self.config.candidate_floor)?;

            for name in &place {
                let Some(group) = groups.get(name) else {
                    continue;
                };
                let (drivers, constraints, resources) = group_request(group);
                stack.prepare_group(drivers, constraints, resources.clone());

                let Some(option) = stack.select(&mut ctx) else {
                    debug!(eval = %eval.id, alloc = %name, "no node satisfies the group, skipping");
                    continue;
                };

                ctx.push_allocation(Allocation {
                    id: Uuid::new_v4().to_string(),
                    name: name.clone(),
                    node_id: option.node.id.clone(),
                    job_id: job.id.clone(),
                    group_spec_hash: group.spec_hash(),
                    resources,
                    status: AllocStatus::Pending,
                });
            }

            let plan = ctx.into_plan();
            let (result, refreshed) = self.planner.submit_plan(&plan)?;

            // The world moved under us: adopt the newer view and start over.
            if let Some(snapshot) = refreshed {
                self.state = snapshot;
                continue;
            }

            let (full, expected, actual) = result.full_commit(&plan);
            if !full {
                debug!(
                    eval = %eval.id,
                    job = %eval.job_id,
                    expected,
                    actual,
                    "plan partially committed, retrying"
                );
                continue;
            }
            return Ok(());
        }
        Err(SchedulerError::ExhaustedAttempts(self.config.max_attempts))
    }

    /// Evict every allocation of a job. Unbounded: there is no placement
    /// work to contend over, so the loop ends as soon as the state stops
    /// changing or the allocation set is empty.
    fn evict_job_allocs(&mut self, eval: &Evaluation) -> SchedulerResult<()> {
        loop {
            let allocs = self.state.allocs_by_job(&eval.job_id)?;
            debug!(
                eval = %eval.id,
                job = %eval.job_id,
                evictions = allocs.len(),
                "evicting job allocations"
            );
            if allocs.is_empty() {
                return Ok(());
            }

            let mut plan = Plan::new(&eval.id, eval.priority);
            for alloc in &allocs {
                plan.append_evict(alloc);
            }

            let (_result, refreshed) = self.planner.submit_plan(&plan)?;
            match refreshed {
                Some(snapshot) => self.state = snapshot,
                None => return Ok(()),
            }
        }
    }
}

/// Aggregate what one task group asks of a node: the union of its drivers,
/// its constraints plus every task's, and the sum of task resources.
fn group_request(group: &TaskGroup) -> (BTreeSet<String>, Vec<gridplan_state::Constraint>, Resources) {
    let mut drivers = BTreeSet::new();
    let mut constraints = group.constraints.clone();
    let mut resources = Resources::default();
    for task in &group.tasks {
        drivers.insert(task.driver.clone());
        constraints.extend(task.constraints.iter().cloned());
        resources.add(&task.resources);
    }
    (drivers, constraints, resources)
}
