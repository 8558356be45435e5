//! Task graph for dependency management and batch layering.
//!
//! `TaskGraph` stores nodes in a petgraph arena. Edges point from a
//! dependency to its dependent. The graph rejects cycles at insertion time,
//! so layering into batches can never observe one.

use crate::core::task::{FailureCause, NodeId, NodeStatus, TaskNode};
use crate::error::{Error, Result};
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Why one node must finish before another starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DependencyType {
    /// The dependent consumes the dependency's output.
    #[default]
    Data,
    /// Both nodes touch the same resource and at least one writes it.
    Resource { resource: String },
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Data => write!(f, "data"),
            DependencyType::Resource { resource } => write!(f, "resource: {}", resource),
        }
    }
}

/// Node ids sharing one dependency depth, sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBatch {
    pub depth: usize,
    pub nodes: Vec<NodeId>,
}

impl TaskBatch {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains(id)
    }
}

/// The execution graph.
#[derive(Clone)]
pub struct TaskGraph {
    graph: DiGraph<TaskNode, DependencyType>,
    index: HashMap<NodeId, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Build a graph from nodes, wiring an edge for every `depends_on` entry.
    ///
    /// # Errors
    /// Returns `Error::Graph` on duplicate ids, unknown dependencies or a cycle.
    pub fn from_nodes(nodes: impl IntoIterator<Item = TaskNode>) -> Result<Self> {
        let mut graph = Self::new();
        let mut edges = Vec::new();
        for node in nodes {
            for dep in &node.depends_on {
                edges.push((dep.clone(), node.id.clone()));
            }
            graph.add_node(node)?;
        }
        for (from, to) in edges {
            graph.add_dependency(&from, &to, DependencyType::Data)?;
        }
        Ok(graph)
    }

    /// Add a node.
    ///
    /// # Errors
    /// Returns `Error::Graph` if a node with the same id exists.
    pub fn add_node(&mut self, node: TaskNode) -> Result<NodeIndex> {
        if self.index.contains_key(&node.id) {
            return Err(Error::Graph(format!("duplicate node: {}", node.id)));
        }
        let id = node.id.clone();
        let index = self.graph.add_node(node);
        self.index.insert(id, index);
        Ok(index)
    }

    /// Record that `from` must finish before `to` starts.
    ///
    /// Adding an edge that already exists is a no-op.
    ///
    /// # Errors
    /// Returns `Error::Graph` if either node is unknown or the edge would
    /// close a cycle.
    pub fn add_dependency(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        dep_type: DependencyType,
    ) -> Result<()> {
        let from_index = self.node_index(from)?;
        let to_index = self.node_index(to)?;

        if self.graph.find_edge(from_index, to_index).is_some() {
            return Ok(());
        }
        if from_index == to_index || has_path_connecting(&self.graph, to_index, from_index, None)
        {
            return Err(Error::Graph(format!(
                "dependency from {} to {} would create a cycle",
                from, to
            )));
        }

        self.graph.add_edge(from_index, to_index, dep_type);
        self.graph[to_index].depends_on.insert(from.clone());
        Ok(())
    }

    fn node_index(&self, id: &NodeId) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::Graph(format!("node {} not found in graph", id)))
    }

    pub fn get(&self, id: &NodeId) -> Option<&TaskNode> {
        self.index.get(id).map(|&index| &self.graph[index])
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut TaskNode> {
        let index = *self.index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether `to` directly depends on `from`.
    pub fn has_dependency(&self, from: &NodeId, to: &NodeId) -> bool {
        self.get_dependency(from, to).is_some()
    }

    pub fn get_dependency(&self, from: &NodeId, to: &NodeId) -> Option<&DependencyType> {
        let from_index = self.index.get(from)?;
        let to_index = self.index.get(to)?;
        let edge = self.graph.find_edge(*from_index, *to_index)?;
        self.graph.edge_weight(edge)
    }

    /// Whether `to` is reachable from `from` through any chain of edges.
    pub fn is_ordered(&self, from: &NodeId, to: &NodeId) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    /// Direct dependencies of a node, sorted by id.
    pub fn dependencies(&self, id: &NodeId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of a node, sorted by id.
    pub fn dependents(&self, id: &NodeId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &NodeId, direction: Direction) -> Vec<&TaskNode> {
        let Some(&index) = self.index.get(id) else {
            return Vec::new();
        };
        let mut nodes: Vec<&TaskNode> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| &self.graph[n])
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.graph.node_weights()
    }

    /// Depth of every node: the length of the longest dependency chain
    /// leading to it from a root.
    pub fn depths(&self) -> Result<HashMap<NodeId, usize>> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            Error::Graph(format!(
                "cycle detected at node {}",
                self.graph[cycle.node_id()].id
            ))
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        for index in order {
            let d = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .filter_map(|dep| depth.get(&dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(index, d);
        }

        Ok(depth
            .into_iter()
            .map(|(index, d)| (self.graph[index].id.clone(), d))
            .collect())
    }

    /// Layer the graph into batches by depth, shallowest first.
    pub fn layers(&self) -> Result<Vec<TaskBatch>> {
        let mut by_depth: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for (id, depth) in self.depths()? {
            by_depth.entry(depth).or_default().push(id);
        }
        Ok(by_depth
            .into_iter()
            .map(|(depth, mut nodes)| {
                nodes.sort();
                TaskBatch { depth, nodes }
            })
            .collect())
    }

    /// The first dependency of `id` that did not succeed, preferring one
    /// that already failed.
    pub fn unsatisfied_dependency(&self, id: &NodeId) -> Option<NodeId> {
        let deps = self.dependencies(id);
        deps.iter()
            .find(|d| matches!(d.status, NodeStatus::Failed { .. }))
            .or_else(|| deps.iter().find(|d| !d.is_succeeded()))
            .map(|d| d.id.clone())
    }

    /// Fail every unfinished node with the given cause.
    pub fn fail_unfinished(&mut self, cause: &FailureCause) -> Vec<NodeId> {
        let mut failed = Vec::new();
        for node in self.graph.node_weights_mut() {
            if !node.is_finished() {
                node.fail(cause.clone());
                failed.push(node.id.clone());
            }
        }
        failed.sort();
        failed
    }

    pub fn all_finished(&self) -> bool {
        self.graph.node_weights().all(TaskNode::is_finished)
    }

    pub fn into_nodes(self) -> impl Iterator<Item = TaskNode> {
        self.graph.into_nodes_edges().0.into_iter().map(|n| n.weight)
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("nodes", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
