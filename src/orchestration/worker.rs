//! Worker invocation boundary.
//!
//! Every node is handed to a single polymorphic `Worker` together with its
//! resolved role. Implementations decide how the instruction is executed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::core::{NodeId, Payload};
use crate::error::Result;
use crate::orchestration::dispatcher::SpawnContext;
use crate::registry::{Operation, WorkerRole};

/// What a worker is asked to do.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub node: NodeId,
    pub role: WorkerRole,
    /// Opaque instruction payload.
    pub instruction: String,
    pub timeout: Duration,
    /// Operations granted for this call.
    pub operations: BTreeSet<Operation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResponse {
    pub status: WorkerStatus,
    pub payload: Option<Payload>,
    pub error: Option<String>,
}

impl WorkerResponse {
    pub fn succeeded(payload: Option<Payload>) -> Self {
        Self {
            status: WorkerStatus::Succeeded,
            payload,
            error: None,
        }
    }

    pub fn text(output: impl Into<String>) -> Self {
        Self::succeeded(Some(Payload::Text(output.into())))
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Failed,
            payload: None,
            error: Some(message.into()),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: WorkerStatus::TimedOut,
            payload: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkerStatus::Succeeded
    }
}

/// Executes one node.
///
/// Returning `Err` is reserved for problems outside the node itself. Fatal
/// errors (see `Error::is_fatal`) abort the whole dispatch once the current
/// batch has joined; anything else is recorded as a node failure.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn invoke(&self, request: WorkerRequest, ctx: SpawnContext) -> Result<WorkerResponse>;
}
