//! Task node data model for the execution graph.
//!
//! A node is one unit of delegated work: an opaque instruction handed to a
//! worker role, plus the bookkeeping the dispatcher needs to run it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::core::outcome::GraphOutcome;
use crate::orchestration::WorkRequest;
use crate::registry::{Operation, RoleId};

/// Identifier of a node within one graph.
///
/// Ids come from slice names in a work request, so they are human-readable
/// and stable across runs of the same request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Why a node ended up Failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FailureCause {
    /// The worker reported a failure.
    Worker { message: String },
    /// The worker did not answer within its timeout.
    TimedOut { after: Duration },
    /// A node listed in `depends_on` did not succeed; this node never ran.
    BlockedByDependency { dependency: NodeId },
    /// A nested dispatch finished with failed nodes.
    ChildFailures { failed: usize },
    /// The caller cancelled the dispatch before this node started.
    Cancelled,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::Worker { message } => write!(f, "{}", message),
            FailureCause::TimedOut { after } => write!(f, "timed out after {:?}", after),
            FailureCause::BlockedByDependency { dependency } => {
                write!(f, "blocked by dependency {}", dependency)
            }
            FailureCause::ChildFailures { failed } => {
                write!(f, "{} child task(s) failed", failed)
            }
            FailureCause::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Node status in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed { cause: FailureCause },
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Succeeded | NodeStatus::Failed { .. })
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Succeeded => write!(f, "succeeded"),
            NodeStatus::Failed { cause } => write!(f, "failed: {}", cause),
        }
    }
}

/// Opaque result produced by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Payload {
    Text(String),
    Structured(serde_json::Value),
    /// Outcome of the tier-2 batch a tier-1 node dispatched.
    Nested(Box<GraphOutcome>),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A single node in the execution graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: NodeId,
    /// Instruction payload handed to the worker verbatim.
    pub description: String,
    pub role: RoleId,
    pub depends_on: BTreeSet<NodeId>,
    pub status: NodeStatus,
    pub result: Option<Payload>,
    /// Requested operations. Empty means the role's whole allow-list.
    pub operations: BTreeSet<Operation>,
    pub timeout: Option<Duration>,
    /// Declared tier-2 decomposition this node expands into.
    pub subplan: Option<WorkRequest>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskNode {
    pub fn new(id: &str, description: &str, role: RoleId) -> Self {
        Self {
            id: NodeId::new(id),
            description: description.to_string(),
            role,
            depends_on: BTreeSet::new(),
            status: NodeStatus::Pending,
            result: None,
            operations: BTreeSet::new(),
            timeout: None,
            subplan: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.depends_on.insert(NodeId::new(id));
        self
    }

    pub fn with_operations(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.operations = ops.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_subplan(mut self, plan: WorkRequest) -> Self {
        self.subplan = Some(plan);
        self
    }

    /// Transition to Running and record the start time.
    pub fn start(&mut self) {
        self.status = NodeStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self, result: Option<Payload>) {
        self.status = NodeStatus::Succeeded;
        self.result = result;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, cause: FailureCause) {
        self.status = NodeStatus::Failed { cause };
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == NodeStatus::Succeeded
    }

    pub fn can_start(&self) -> bool {
        self.status == NodeStatus::Pending
    }
}
