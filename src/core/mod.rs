//! Core domain models for tiered orchestration.
//!
//! Task nodes, the arena-indexed execution graph, and the aggregated
//! outcome of a dispatch.

pub mod dag;
pub mod outcome;
pub mod task;

pub use dag::{DependencyType, TaskBatch, TaskGraph};
pub use outcome::{GraphOutcome, NodeReport};
pub use task::{FailureCause, NodeId, NodeStatus, Payload, TaskNode};
