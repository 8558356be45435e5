//! Tiered dispatcher.
//!
//! Runs a `TaskGraph` batch by batch. Every node in a batch is invoked
//! concurrently and the batch joins only once all of them are terminal.
//! A failed node never cancels its siblings; its dependents are marked
//! blocked without running.

use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TimeoutPolicy;
use crate::core::{FailureCause, GraphOutcome, NodeId, Payload, TaskGraph};
use crate::error::{Error, Result};
use crate::orchestration::planner::{GraphBuilder, WorkRequest};
use crate::orchestration::worker::{Worker, WorkerRequest, WorkerStatus};
use crate::registry::{CapabilityRegistry, Operation, RoleId, WorkerRole};

/// Lifecycle events emitted while a dispatch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    BatchStarted { depth: usize, nodes: Vec<NodeId> },
    NodeStarted { node: NodeId, role: RoleId },
    NodeSucceeded { node: NodeId },
    NodeFailed { node: NodeId, cause: FailureCause },
    BatchJoined { depth: usize },
    Cancelled { pending: Vec<NodeId> },
    Completed { succeeded: usize, failed: usize },
}

/// Runs task graphs against a registry and a worker.
///
/// Cloning is cheap; clones share the registry, worker, event channel and
/// cancellation token.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    worker: Arc<dyn Worker>,
    timeouts: TimeoutPolicy,
    events: Option<mpsc::Sender<DispatchEvent>>,
    cancel: CancellationToken,
}

/// Handed to every worker call so coordinators can fan out dynamically.
#[derive(Clone)]
pub struct SpawnContext {
    dispatcher: Dispatcher,
    caller: WorkerRole,
    granted: BTreeSet<Operation>,
}

impl SpawnContext {
    pub fn caller(&self) -> &WorkerRole {
        &self.caller
    }

    /// Build and run a nested graph with the caller as parent.
    ///
    /// # Errors
    /// A tier-2 caller is rejected with `DepthExceeded` before anything runs.
    /// A call that was not granted `task-spawn` gets `OperationDenied`.
    pub async fn spawn(&self, request: &WorkRequest) -> Result<GraphOutcome> {
        self.caller.check_may_spawn_with(&self.granted)?;
        self.dispatcher.dispatch(self.caller.id(), request).await
    }
}

/// Job prepared for one node. Owns everything the worker call needs.
struct Job {
    node: NodeId,
    role: WorkerRole,
    instruction: String,
    timeout: Duration,
    operations: BTreeSet<Operation>,
    subplan: Option<WorkRequest>,
}

enum Settled {
    Succeeded(Option<Payload>),
    Failed {
        cause: FailureCause,
        payload: Option<Payload>,
    },
}

impl Settled {
    fn failed(cause: FailureCause) -> Self {
        Settled::Failed {
            cause,
            payload: None,
        }
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>, worker: Arc<dyn Worker>) -> Self {
        Self {
            registry,
            worker,
            timeouts: TimeoutPolicy::default(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<DispatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Build the graph for `request` and run it.
    pub async fn dispatch(&self, parent: &RoleId, request: &WorkRequest) -> Result<GraphOutcome> {
        let graph = GraphBuilder::new(&self.registry).build(parent, request)?;
        self.run(parent, graph).await
    }

    /// Run a graph to completion with `parent` as the fanning-out role.
    ///
    /// The whole graph is validated before the first batch starts.
    ///
    /// # Errors
    /// Configuration, graph, depth and operation errors abort the run. A
    /// fatal error returned by a worker aborts once its batch has joined.
    pub fn run<'a>(
        &'a self,
        parent: &'a RoleId,
        graph: TaskGraph,
    ) -> BoxFuture<'a, Result<GraphOutcome>> {
        async move {
            let parent_role = self.registry.get(parent)?;
            self.validate(parent_role, &graph)?;
            let batches = graph.layers()?;
            let mut graph = graph;

            info!(
                parent = %parent,
                nodes = graph.len(),
                batches = batches.len(),
                "dispatch started"
            );

            for batch in &batches {
                if self.cancel.is_cancelled() {
                    let pending = graph.fail_unfinished(&FailureCause::Cancelled);
                    warn!(parent = %parent, pending = pending.len(), "dispatch cancelled");
                    self.emit(DispatchEvent::Cancelled { pending }).await;
                    break;
                }

                self.emit(DispatchEvent::BatchStarted {
                    depth: batch.depth,
                    nodes: batch.nodes.clone(),
                })
                .await;

                let mut jobs = Vec::with_capacity(batch.len());
                for id in &batch.nodes {
                    if let Some(dependency) = graph.unsatisfied_dependency(id) {
                        let cause = FailureCause::BlockedByDependency { dependency };
                        debug!(node = %id, %cause, "node blocked");
                        if let Some(node) = graph.get_mut(id) {
                            node.fail(cause.clone());
                        }
                        self.emit(DispatchEvent::NodeFailed {
                            node: id.clone(),
                            cause,
                        })
                        .await;
                        continue;
                    }
                    let Some(node) = graph.get_mut(id) else {
                        continue;
                    };
                    node.start();
                    let role = self.registry.get(&node.role)?.clone();
                    jobs.push(Job {
                        node: node.id.clone(),
                        operations: role.effective_operations(&node.operations),
                        instruction: node.description.clone(),
                        timeout: self.timeouts.resolve(node.timeout),
                        subplan: node.subplan.clone(),
                        role,
                    });
                }

                for job in &jobs {
                    self.emit(DispatchEvent::NodeStarted {
                        node: job.node.clone(),
                        role: job.role.id().clone(),
                    })
                    .await;
                }

                let settled = join_all(jobs.into_iter().map(|job| self.execute(job))).await;

                let mut fatal = None;
                for (id, result) in settled {
                    let settled = match result {
                        Ok(settled) => settled,
                        Err(e) if e.is_fatal() => {
                            warn!(node = %id, error = %e, "fatal worker error");
                            let cause = FailureCause::Worker {
                                message: e.to_string(),
                            };
                            fatal.get_or_insert(e);
                            Settled::failed(cause)
                        }
                        Err(Error::Timeout(after)) => {
                            Settled::failed(FailureCause::TimedOut { after })
                        }
                        Err(e) => Settled::failed(FailureCause::Worker {
                            message: e.to_string(),
                        }),
                    };
                    self.settle(&mut graph, id, settled).await;
                }

                self.emit(DispatchEvent::BatchJoined { depth: batch.depth })
                    .await;

                if let Some(e) = fatal {
                    return Err(e);
                }
            }

            let outcome = GraphOutcome::collect(batches, graph);
            let failed = outcome.failed().count();
            let succeeded = outcome.succeeded().count();
            info!(parent = %parent, succeeded, failed, "dispatch completed");
            self.emit(DispatchEvent::Completed { succeeded, failed })
                .await;
            Ok(outcome)
        }
        .boxed()
    }

    /// Reject anything that would break tier, operation or depth rules.
    fn validate(&self, parent: &WorkerRole, graph: &TaskGraph) -> Result<()> {
        parent.check_may_spawn()?;
        let builder = GraphBuilder::new(&self.registry);
        for node in graph.nodes() {
            let role = self.registry.get(&node.role)?;
            parent.check_spawn(role)?;
            role.check_operations(&node.operations)?;
            if let Some(plan) = &node.subplan {
                role.check_may_spawn_with(&role.effective_operations(&node.operations))?;
                builder.build(role.id(), plan)?;
            }
        }
        Ok(())
    }

    async fn execute(&self, mut job: Job) -> (NodeId, Result<Settled>) {
        let node = job.node.clone();
        let timeout = job.timeout;
        debug!(node = %node, role = %job.role.id(), ?timeout, "invoking worker");

        let result = match job.subplan.take() {
            Some(plan) => self.expand(&job, &plan).await,
            None => self.invoke(job).await,
        };
        (node, result)
    }

    async fn expand(&self, job: &Job, plan: &WorkRequest) -> Result<Settled> {
        let graph = GraphBuilder::new(&self.registry).build(job.role.id(), plan)?;
        let outcome = match tokio::time::timeout(job.timeout, self.run(job.role.id(), graph)).await
        {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Ok(Settled::failed(FailureCause::TimedOut { after: job.timeout }));
            }
        };

        let failed = outcome.failed().count();
        let payload = Some(Payload::Nested(Box::new(outcome)));
        if failed == 0 {
            Ok(Settled::Succeeded(payload))
        } else {
            Ok(Settled::Failed {
                cause: FailureCause::ChildFailures { failed },
                payload,
            })
        }
    }

    async fn invoke(&self, job: Job) -> Result<Settled> {
        let timeout = job.timeout;
        let ctx = SpawnContext {
            dispatcher: self.clone(),
            caller: job.role.clone(),
            granted: job.operations.clone(),
        };
        let request = WorkerRequest {
            node: job.node,
            role: job.role,
            instruction: job.instruction,
            timeout,
            operations: job.operations,
        };

        let response = match tokio::time::timeout(timeout, self.worker.invoke(request, ctx)).await {
            Ok(response) => response?,
            Err(_) => return Ok(Settled::failed(FailureCause::TimedOut { after: timeout })),
        };

        Ok(match response.status {
            WorkerStatus::Succeeded => Settled::Succeeded(response.payload),
            WorkerStatus::Failed => Settled::failed(FailureCause::Worker {
                message: response
                    .error
                    .unwrap_or_else(|| "worker reported failure".to_string()),
            }),
            WorkerStatus::TimedOut => Settled::failed(FailureCause::TimedOut { after: timeout }),
        })
    }

    async fn settle(&self, graph: &mut TaskGraph, id: NodeId, settled: Settled) {
        let Some(node) = graph.get_mut(&id) else {
            return;
        };
        let event = match settled {
            Settled::Succeeded(payload) => {
                node.succeed(payload);
                debug!(node = %id, "node succeeded");
                DispatchEvent::NodeSucceeded { node: id }
            }
            Settled::Failed { cause, payload } => {
                node.fail(cause.clone());
                node.result = payload;
                warn!(node = %id, %cause, "node failed");
                DispatchEvent::NodeFailed { node: id, cause }
            }
        };
        self.emit(event).await;
    }

    async fn emit(&self, event: DispatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}
