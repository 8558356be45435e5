//! Task graph builder.
//!
//! Turns a declared decomposition (`WorkRequest`) into a `TaskGraph` for a
//! given parent role. Edges are added only for declared data dependencies and
//! for resource conflicts, so independent slices always share a batch.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::core::{DependencyType, NodeId, TaskGraph, TaskNode};
use crate::error::{Error, Result};
use crate::registry::{CapabilityRegistry, Operation, RoleId, WorkerRole};

/// A decomposition of one unit of work into slices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkRequest {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub slices: Vec<Slice>,
}

/// One slice of a work request, assigned to a single role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub name: String,
    pub role: RoleId,
    #[serde(default)]
    pub instruction: String,
    /// Slices whose output this slice consumes.
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
    #[serde(default)]
    pub operations: BTreeSet<Operation>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Nested decomposition run by this slice's role.
    #[serde(default)]
    pub subtasks: Vec<Slice>,
}

impl Slice {
    pub fn new(name: &str, role: RoleId, instruction: &str) -> Self {
        Self {
            name: name.to_string(),
            role,
            instruction: instruction.to_string(),
            needs: Vec::new(),
            reads: Vec::new(),
            writes: Vec::new(),
            operations: BTreeSet::new(),
            timeout_secs: None,
            subtasks: Vec::new(),
        }
    }

    pub fn needs(mut self, name: &str) -> Self {
        self.needs.push(name.to_string());
        self
    }

    pub fn reads(mut self, resource: &str) -> Self {
        self.reads.push(resource.to_string());
        self
    }

    pub fn writes(mut self, resource: &str) -> Self {
        self.writes.push(resource.to_string());
        self
    }

    pub fn with_subtask(mut self, slice: Slice) -> Self {
        self.subtasks.push(slice);
        self
    }

    /// The nested request this slice expands into, if any.
    pub fn subplan(&self) -> Option<WorkRequest> {
        if self.subtasks.is_empty() {
            return None;
        }
        Some(WorkRequest {
            summary: self.instruction.clone(),
            slices: self.subtasks.clone(),
        })
    }

    /// Resources read by this slice or any of its nested subtasks.
    fn all_reads(&self) -> BTreeSet<&str> {
        let mut reads: BTreeSet<&str> = self.reads.iter().map(String::as_str).collect();
        for sub in &self.subtasks {
            reads.extend(sub.all_reads());
        }
        reads
    }

    /// Resources written by this slice or any of its nested subtasks.
    fn all_writes(&self) -> BTreeSet<&str> {
        let mut writes: BTreeSet<&str> = self.writes.iter().map(String::as_str).collect();
        for sub in &self.subtasks {
            writes.extend(sub.all_writes());
        }
        writes
    }
}

impl WorkRequest {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            slices: Vec::new(),
        }
    }

    pub fn with_slice(mut self, slice: Slice) -> Self {
        self.slices.push(slice);
        self
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }
}

/// Builds execution graphs against a registry.
pub struct GraphBuilder<'a> {
    registry: &'a CapabilityRegistry,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a CapabilityRegistry) -> Self {
        Self { registry }
    }

    /// Build the graph `parent` fans out to.
    ///
    /// Nested subtasks are validated recursively but stay attached to their
    /// node as a subplan; the dispatcher expands them when the node runs.
    ///
    /// # Errors
    /// - `DepthExceeded` if `parent`, or a slice carrying subtasks, is tier 2
    /// - `OperationDenied` if a role lacks an operation it needs, or a slice
    ///   carries subtasks without being granted `task-spawn`
    /// - `Graph` for malformed decompositions: duplicate or unknown slice
    ///   names, roles at the wrong tier, cycles
    /// - `Configuration` for unknown roles
    pub fn build(&self, parent: &RoleId, request: &WorkRequest) -> Result<TaskGraph> {
        let parent_role = self.registry.get(parent)?;
        parent_role.check_may_spawn()?;

        let mut names = HashSet::new();
        for slice in &request.slices {
            if slice.name.trim().is_empty() {
                return Err(Error::Graph("slice with empty name".to_string()));
            }
            if !names.insert(slice.name.trim()) {
                return Err(Error::Graph(format!("duplicate slice: {}", slice.name)));
            }
        }

        let mut nodes = Vec::with_capacity(request.slices.len());
        for slice in &request.slices {
            let role = self.registry.get(&slice.role)?;
            parent_role.check_spawn(role)?;
            role.check_operations(&slice.operations)?;
            nodes.push(self.node_for(slice, role)?);
        }

        let mut graph = TaskGraph::from_nodes(nodes)?;
        add_resource_edges(&mut graph, &request.slices)?;

        debug!(
            parent = %parent,
            nodes = graph.len(),
            edges = graph.dependency_count(),
            "built task graph"
        );
        Ok(graph)
    }

    fn node_for(&self, slice: &Slice, role: &WorkerRole) -> Result<TaskNode> {
        let mut node = TaskNode::new(&slice.name, &slice.instruction, slice.role.clone())
            .with_operations(slice.operations.iter().copied());
        for dep in &slice.needs {
            node = node.depends_on(dep);
        }
        if let Some(secs) = slice.timeout_secs {
            node = node.with_timeout(Duration::from_secs(secs));
        }
        if let Some(plan) = slice.subplan() {
            role.check_may_spawn_with(&role.effective_operations(&slice.operations))?;
            self.build(role.id(), &plan)?;
            node = node.with_subplan(plan);
        }
        Ok(node)
    }
}

/// Order every pair of slices that touch a shared resource where at least
/// one of them writes it. Declaration order decides direction. Pairs that are
/// already ordered through other edges are left alone.
fn add_resource_edges(graph: &mut TaskGraph, slices: &[Slice]) -> Result<()> {
    for (i, first) in slices.iter().enumerate() {
        for second in &slices[i + 1..] {
            let Some(resource) = conflict(first, second) else {
                continue;
            };
            let a = NodeId::new(&first.name);
            let b = NodeId::new(&second.name);
            if graph.is_ordered(&a, &b) || graph.is_ordered(&b, &a) {
                continue;
            }
            graph.add_dependency(&a, &b, DependencyType::Resource { resource })?;
        }
    }
    Ok(())
}

/// First resource one side writes while the other reads or writes it.
/// Subtasks count toward their parent slice, since they run while it does.
fn conflict(a: &Slice, b: &Slice) -> Option<String> {
    let (a_reads, a_writes) = (a.all_reads(), a.all_writes());
    let (b_reads, b_writes) = (b.all_reads(), b.all_writes());
    a_writes
        .iter()
        .find(|r| b_writes.contains(*r) || b_reads.contains(*r))
        .or_else(|| b_writes.iter().find(|r| a_reads.contains(*r)))
        .map(|r| r.to_string())
}
