//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted workers with per-node delays, failures and nested spawns
//! - Scripted validation step runners
//! - Temporary project directories

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use tierflow::core::Payload;
use tierflow::orchestration::{
    Dispatcher, SpawnContext, WorkRequest, Worker, WorkerRequest, WorkerResponse,
};
use tierflow::registry::{CapabilityRegistry, RoleId};
use tierflow::workflow::{StepOutcome, StepRunner, StepSpec};
use tierflow::{Error, Result};

pub fn role(name: &str) -> RoleId {
    RoleId::new(name).expect("valid role id")
}

/// What a scripted worker does for one node.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub delay: Option<Duration>,
    pub fail: Option<String>,
    pub spawn: Option<WorkRequest>,
}

impl Script {
    pub fn after(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn spawning(request: WorkRequest) -> Self {
        Self {
            spawn: Some(request),
            ..Default::default()
        }
    }
}

/// Worker that follows a per-node script and records what ran.
///
/// Nodes without a script succeed immediately and echo their instruction.
#[derive(Default)]
pub struct ScriptedWorker {
    scripts: HashMap<String, Script>,
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, node: &str, script: Script) -> Self {
        self.scripts.insert(node.to_string(), script);
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn invoke(&self, request: WorkerRequest, ctx: SpawnContext) -> Result<WorkerResponse> {
        let node = request.node.to_string();
        self.started.lock().unwrap().push(node.clone());
        let script = self.scripts.get(&node).cloned().unwrap_or_default();

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        let response = if let Some(plan) = &script.spawn {
            let outcome = ctx.spawn(plan).await?;
            WorkerResponse::succeeded(Some(Payload::Nested(Box::new(outcome))))
        } else if let Some(message) = script.fail {
            WorkerResponse::failed(message)
        } else {
            WorkerResponse::text(request.instruction)
        };

        self.finished.lock().unwrap().push(node);
        Ok(response)
    }
}

pub fn dispatcher(worker: Arc<dyn Worker>) -> Dispatcher {
    Dispatcher::new(Arc::new(CapabilityRegistry::builtin()), worker)
}

/// Step runner that replies from a table and records the call order.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: HashMap<String, StepOutcome>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(mut self, step: &str) -> Self {
        self.replies
            .insert(step.to_string(), StepOutcome::exited(0, ""));
        self
    }

    pub fn fail(mut self, step: &str, output: &str) -> Self {
        self.replies
            .insert(step.to_string(), StepOutcome::exited(1, output));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run(&self, step: &StepSpec) -> Result<StepOutcome> {
        self.calls.lock().unwrap().push(step.name.clone());
        self.replies
            .get(&step.name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("unscripted step {}", step.name)))
    }
}

/// A temporary project directory seeded with files.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).expect("Failed to write file");
        }
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
