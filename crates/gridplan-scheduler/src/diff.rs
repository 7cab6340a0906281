//! Reconciliation of desired against observed allocations.
//!
//! The diff partitions allocation names into four disjoint sets whose union
//! covers everything the job wants plus everything that currently exists:
//! names to place, names whose group definition changed (update), names to
//! evict, and names to leave alone.

use std::collections::HashMap;

use gridplan_state::{Allocation, Job, TaskGroup};

/// The four disjoint outcome sets of a diff, each sorted for determinism.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocDiff {
    /// Desired but not running: create an allocation.
    pub place: Vec<String>,
    /// Running but stale: evict and re-place.
    pub update: Vec<String>,
    /// Running but no longer desired: evict.
    pub evict: Vec<String>,
    /// Running and current: leave untouched.
    pub ignore: Vec<String>,
}

impl AllocDiff {
    /// True when the evaluation requires no plan at all.
    pub fn is_noop(&self) -> bool {
        self.place.is_empty() && self.update.is_empty() && self.evict.is_empty()
    }
}

/// Expand every task group into its desired allocation names,
/// `<job_id>.<group>[<index>]` for index in `0..count`, keyed by name.
pub fn materialize_task_groups(job: &Job) -> HashMap<String, TaskGroup> {
    let mut out = HashMap::new();
    for group in &job.task_groups {
        for index in 0..group.count {
            out.insert(
                Allocation::name_for(&job.id, &group.name, index),
                group.clone(),
            );
        }
    }
    out
}

/// Index existing allocations by name; the latest entry wins if the store
/// ever hands back duplicates.
pub fn index_allocs(allocs: Vec<Allocation>) -> HashMap<String, Allocation> {
    let mut out = HashMap::new();
    for alloc in allocs {
        out.insert(alloc.name.clone(), alloc);
    }
    out
}

/// Partition names into place / update / evict / ignore.
///
/// An existing allocation is current when its recorded group fingerprint
/// matches the live group definition; count changes never touch the
/// fingerprint, so a shrink surfaces purely as evictions of the dropped
/// high-index names.
pub fn diff_allocs(
    desired: &HashMap<String, TaskGroup>,
    existing: &HashMap<String, Allocation>,
) -> AllocDiff {
    let mut diff = AllocDiff::default();

    // Hash each distinct group once.
    let mut hashes: HashMap<&str, String> = HashMap::new();
    for group in desired.values() {
        hashes
            .entry(group.name.as_str())
            .or_insert_with(|| group.spec_hash());
    }

    for (name, group) in desired {
        match existing.get(name) {
            None => diff.place.push(name.clone()),
            Some(alloc) => {
                if Some(&alloc.group_spec_hash) == hashes.get(group.name.as_str()) {
                    diff.ignore.push(name.clone());
                } else {
                    diff.update.push(name.clone());
                }
            }
        }
    }

    for name in existing.keys() {
        if !desired.contains_key(name) {
            diff.evict.push(name.clone());
        }
    }

    diff.place.sort();
    diff.update.sort();
    diff.evict.sort();
    diff.ignore.sort();
    diff
}
