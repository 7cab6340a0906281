//! Domain types for the gridplan scheduler.
//!
//! These types model the declarative job specification, the cluster's nodes
//! and allocations, and the plan a scheduler submits to the planner. All
//! types are serializable; none carry live references — an allocation points
//! back at its job through a version fingerprint, not an embedded object.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique identifier for a job.
pub type JobId = String;

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Unique identifier for an allocation.
pub type AllocationId = String;

// ── Resources ─────────────────────────────────────────────────────

/// A resource quantity, used both for node capacity and task requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    /// CPU in MHz.
    pub cpu_mhz: u32,
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Local disk in megabytes.
    pub disk_mb: u64,
}

impl Resources {
    /// Accumulate another resource quantity into this one.
    pub fn add(&mut self, other: &Resources) {
        self.cpu_mhz += other.cpu_mhz;
        self.memory_mb += other.memory_mb;
        self.disk_mb += other.disk_mb;
    }

    /// Whether every dimension of `self` covers the corresponding dimension
    /// of `other`.
    pub fn superset_of(&self, other: &Resources) -> bool {
        self.cpu_mhz >= other.cpu_mhz
            && self.memory_mb >= other.memory_mb
            && self.disk_mb >= other.disk_mb
    }

    /// Per-dimension saturating subtraction.
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu_mhz: self.cpu_mhz.saturating_sub(other.cpu_mhz),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb),
            disk_mb: self.disk_mb.saturating_sub(other.disk_mb),
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// Lifecycle status of a node. Only `Ready` nodes receive placements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Init,
    Ready,
    Down,
    Drain,
}

/// A schedulable member of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Datacenter this node belongs to.
    pub datacenter: String,
    pub status: NodeStatus,
    /// Total resource capacity advertised by the node.
    pub resources: Resources,
    /// Arbitrary fingerprinted attributes (kernel version, arch, ...).
    pub attributes: HashMap<String, String>,
    /// Driver kinds this node can run.
    pub drivers: BTreeSet<String>,
}

impl Node {
    /// Resolve a constraint target against this node. `id` and `datacenter`
    /// are addressable alongside the fingerprinted attributes.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        match key {
            "id" => Some(&self.id),
            "datacenter" => Some(&self.datacenter),
            _ => self.attributes.get(key).map(String::as_str),
        }
    }
}

// ── Constraint ────────────────────────────────────────────────────

/// Operator catalog for constraint predicates. The set is fixed; schedulers
/// reject nothing here — an unknown attribute simply fails to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOperator {
    Equal,
    NotEqual,
    /// Node attribute is a comma-separated list containing the value.
    SetContains,
    /// Value is a regular expression matched against the attribute.
    Regexp,
    /// Dotted-numeric version comparison, attribute >= value.
    VersionAtLeast,
}

/// A predicate over a node, evaluated during feasibility checking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraint {
    /// Attribute to resolve on the node (`id`, `datacenter`, or a
    /// fingerprinted key).
    pub attribute: String,
    pub operator: ConstraintOperator,
    pub value: String,
}

impl Constraint {
    /// Evaluate this constraint against a node. A missing attribute fails
    /// every operator except `NotEqual`.
    pub fn matches(&self, node: &Node) -> bool {
        let Some(actual) = node.attribute(&self.attribute) else {
            return self.operator == ConstraintOperator::NotEqual;
        };
        match self.operator {
            ConstraintOperator::Equal => actual == self.value,
            ConstraintOperator::NotEqual => actual != self.value,
            ConstraintOperator::SetContains => {
                actual.split(',').map(str::trim).any(|m| m == self.value)
            }
            ConstraintOperator::Regexp => match regex::Regex::new(&self.value) {
                Ok(re) => re.is_match(actual),
                Err(_) => false,
            },
            ConstraintOperator::VersionAtLeast => {
                version_at_least(actual, &self.value)
            }
        }
    }
}

/// Dotted-numeric comparison: `actual >= wanted`. Non-numeric segments
/// compare as zero; missing segments compare as zero.
fn version_at_least(actual: &str, wanted: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|seg| seg.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let a = parse(actual);
    let w = parse(wanted);
    for i in 0..a.len().max(w.len()) {
        let av = a.get(i).copied().unwrap_or(0);
        let wv = w.get(i).copied().unwrap_or(0);
        if av != wv {
            return av > wv;
        }
    }
    true
}

// ── Job ───────────────────────────────────────────────────────────

/// A declarative service job: where it may run and what it consists of.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Scheduling priority; higher wins tie-breaks at the planner.
    pub priority: u32,
    /// Datacenters this job is allowed to run in.
    pub datacenters: Vec<String>,
    /// Constraints applying to every task group.
    pub constraints: Vec<Constraint>,
    pub task_groups: Vec<TaskGroup>,
}

/// A set of co-scheduled tasks, replicated `count` times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskGroup {
    /// Name, unique within the job.
    pub name: String,
    /// Desired number of instances.
    pub count: u32,
    pub constraints: Vec<Constraint>,
    pub tasks: Vec<Task>,
}

/// A single task within a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub name: String,
    /// Driver kind required to run this task.
    pub driver: String,
    pub resources: Resources,
    pub constraints: Vec<Constraint>,
}

impl TaskGroup {
    /// Structural fingerprint of this group's definition, count excluded.
    ///
    /// Two allocations whose groups hash equal are considered up to date; a
    /// count change alone never alters the hash, so scale-up and scale-down
    /// surface purely as placements and evictions of indexed names.
    pub fn spec_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b";");
        hash_constraints(&mut hasher, &self.constraints);
        for task in &self.tasks {
            hasher.update(task.name.as_bytes());
            hasher.update(b":");
            hasher.update(task.driver.as_bytes());
            hasher.update(b":");
            hasher.update(
                format!(
                    "{}:{}:{}",
                    task.resources.cpu_mhz, task.resources.memory_mb, task.resources.disk_mb
                )
                .as_bytes(),
            );
            hash_constraints(&mut hasher, &task.constraints);
            hasher.update(b";");
        }
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

fn hash_constraints(hasher: &mut Sha256, constraints: &[Constraint]) {
    for c in constraints {
        hasher.update(c.attribute.as_bytes());
        hasher.update(b":");
        hasher.update(format!("{:?}", c.operator).as_bytes());
        hasher.update(b":");
        hasher.update(c.value.as_bytes());
        hasher.update(b"|");
    }
}

// ── Allocation ────────────────────────────────────────────────────

/// Lifecycle status of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Evict,
}

impl AllocStatus {
    /// Terminal allocations no longer consume node capacity.
    pub fn terminal(&self) -> bool {
        matches!(self, AllocStatus::Complete | AllocStatus::Failed | AllocStatus::Evict)
    }
}

/// A binding of one task-group instance to one node — the atomic unit of
/// placement and eviction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Allocation {
    pub id: AllocationId,
    /// Name of the form `<job_id>.<group>[<index>]`.
    pub name: String,
    pub node_id: NodeId,
    pub job_id: JobId,
    /// Fingerprint of the group definition this allocation was created from;
    /// compared against the live job to detect in-place spec changes.
    pub group_spec_hash: String,
    /// Resources aggregated over the group's tasks.
    pub resources: Resources,
    pub status: AllocStatus,
}

impl Allocation {
    /// Build the indexed allocation name for one group instance.
    pub fn name_for(job_id: &str, group: &str, index: u32) -> String {
        format!("{job_id}.{group}[{index}]")
    }
}

// ── Evaluation ────────────────────────────────────────────────────

/// What caused an evaluation to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    JobRegister,
    JobDeregister,
    NodeUpdate,
    AllocFailure,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerReason::JobRegister => "job-register",
            TriggerReason::JobDeregister => "job-deregister",
            TriggerReason::NodeUpdate => "node-update",
            TriggerReason::AllocFailure => "alloc-failure",
        };
        f.write_str(s)
    }
}

/// A unit of scheduler work: reconcile one job for one trigger reason.
/// Evaluations are immutable inputs produced by the cluster leader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub id: String,
    pub job_id: JobId,
    pub triggered_by: TriggerReason,
    pub priority: u32,
}

// ── Plan ──────────────────────────────────────────────────────────

/// The scheduler's proposed delta for one evaluation: allocations to evict
/// and pending allocations to create, both keyed by node. Write-only from
/// the scheduler, consumed atomically by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub eval_id: String,
    pub priority: u32,
    /// Node id → allocation ids to evict on that node.
    pub node_evict: HashMap<NodeId, Vec<AllocationId>>,
    /// Node id → pending allocations to create on that node.
    pub node_allocation: HashMap<NodeId, Vec<Allocation>>,
}

impl Plan {
    /// Start an empty plan for an evaluation.
    pub fn new(eval_id: &str, priority: u32) -> Self {
        Self {
            eval_id: eval_id.to_string(),
            priority,
            node_evict: HashMap::new(),
            node_allocation: HashMap::new(),
        }
    }

    /// Mark an existing allocation for eviction.
    pub fn append_evict(&mut self, alloc: &Allocation) {
        self.node_evict
            .entry(alloc.node_id.clone())
            .or_default()
            .push(alloc.id.clone());
    }

    /// Append a pending allocation. Idempotent on allocation name: a second
    /// allocation with a name already in the plan is dropped.
    pub fn append_alloc(&mut self, alloc: Allocation) {
        if self.contains_name(&alloc.name) {
            return;
        }
        self.node_allocation
            .entry(alloc.node_id.clone())
            .or_default()
            .push(alloc);
    }

    /// Whether a pending allocation with this name is already planned.
    pub fn contains_name(&self, name: &str) -> bool {
        self.node_allocation
            .values()
            .flatten()
            .any(|a| a.name == name)
    }

    /// Whether an allocation id is already marked for eviction.
    pub fn evicts(&self, alloc_id: &str) -> bool {
        self.node_evict.values().flatten().any(|id| id == alloc_id)
    }

    /// Number of pending allocations across all nodes.
    pub fn pending_count(&self) -> usize {
        self.node_allocation.values().map(Vec::len).sum()
    }

    /// Number of evictions across all nodes.
    pub fn evict_count(&self) -> usize {
        self.node_evict.values().map(Vec::len).sum()
    }

    /// True when the plan carries neither evictions nor placements.
    pub fn is_empty(&self) -> bool {
        self.node_evict.is_empty() && self.node_allocation.is_empty()
    }
}
