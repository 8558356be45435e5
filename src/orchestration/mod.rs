//! Orchestration layer: graph building, worker invocation and tiered
//! dispatch.
//!
//! A root role hands a `WorkRequest` to the `GraphBuilder`, the resulting
//! graph is run by the `Dispatcher`, and every node reaches a `Worker` with
//! its resolved role. Coordinators may fan out once more, either through a
//! declared subplan or dynamically through their `SpawnContext`.

mod agent;
mod analyst;
mod dispatcher;
mod planner;
mod router;
mod worker;

pub use agent::{AgentCliWorker, AgentResponse, ResultType};
pub use analyst::FeasibilityWorker;
pub use dispatcher::{DispatchEvent, Dispatcher, SpawnContext};
pub use planner::{GraphBuilder, Slice, WorkRequest};
pub use router::RoleRouter;
pub use worker::{Worker, WorkerRequest, WorkerResponse, WorkerStatus};
