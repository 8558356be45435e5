//! Aggregated result of one dispatch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::dag::{TaskBatch, TaskGraph};
use crate::core::task::{FailureCause, NodeId, NodeStatus, Payload};
use crate::error::{Error, Result};
use crate::registry::RoleId;

/// Terminal state of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub role: RoleId,
    pub status: NodeStatus,
    pub result: Option<Payload>,
}

/// Per-node reports keyed by node id.
///
/// The map is ordered by id, so two dispatches that reach the same terminal
/// states compare equal no matter which sibling finished first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphOutcome {
    pub batches: Vec<TaskBatch>,
    pub nodes: BTreeMap<NodeId, NodeReport>,
}

impl GraphOutcome {
    /// Snapshot the terminal state of a finished graph.
    pub fn collect(batches: Vec<TaskBatch>, graph: TaskGraph) -> Self {
        let nodes = graph
            .into_nodes()
            .map(|node| {
                (
                    node.id.clone(),
                    NodeReport {
                        id: node.id,
                        role: node.role,
                        status: node.status,
                        result: node.result,
                    },
                )
            })
            .collect();
        Self { batches, nodes }
    }

    pub fn is_success(&self) -> bool {
        self.nodes
            .values()
            .all(|n| n.status == NodeStatus::Succeeded)
    }

    /// Turn a failed dispatch into an error naming one failed node.
    ///
    /// A node that failed on its own is preferred over one that was only
    /// blocked by it.
    pub fn ensure_succeeded(&self) -> Result<()> {
        let blocked = |n: &&NodeReport| {
            matches!(
                n.status,
                NodeStatus::Failed {
                    cause: FailureCause::BlockedByDependency { .. }
                }
            )
        };
        let culprit = self
            .failed()
            .find(|n| !blocked(n))
            .or_else(|| self.nodes.values().find(|n| n.status != NodeStatus::Succeeded));
        match culprit {
            None => Ok(()),
            Some(report) => Err(Error::NodeFailure {
                node: report.id.to_string(),
                cause: match &report.status {
                    NodeStatus::Failed { cause } => cause.to_string(),
                    other => format!("{:?}", other),
                },
            }),
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeReport> {
        self.nodes.get(id)
    }

    pub fn status(&self, id: &str) -> Option<&NodeStatus> {
        self.nodes.get(&NodeId::new(id)).map(|n| &n.status)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes
            .values()
            .filter(|n| n.status == NodeStatus::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes
            .values()
            .filter(|n| matches!(n.status, NodeStatus::Failed { .. }))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
