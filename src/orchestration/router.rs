//! Routes worker calls by role.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::orchestration::dispatcher::SpawnContext;
use crate::orchestration::worker::{Worker, WorkerRequest, WorkerResponse};
use crate::registry::RoleId;

/// Sends each request to the worker registered for its role, or to the
/// fallback when none is.
pub struct RoleRouter {
    routes: HashMap<RoleId, Arc<dyn Worker>>,
    fallback: Arc<dyn Worker>,
}

impl RoleRouter {
    pub fn new(fallback: Arc<dyn Worker>) -> Self {
        Self {
            routes: HashMap::new(),
            fallback,
        }
    }

    pub fn route(mut self, role: RoleId, worker: Arc<dyn Worker>) -> Self {
        self.routes.insert(role, worker);
        self
    }

    pub fn has_route(&self, role: &RoleId) -> bool {
        self.routes.contains_key(role)
    }
}

#[async_trait]
impl Worker for RoleRouter {
    async fn invoke(&self, request: WorkerRequest, ctx: SpawnContext) -> Result<WorkerResponse> {
        let worker = match self.routes.get(request.role.id()) {
            Some(worker) => worker,
            None => &self.fallback,
        };
        debug!(
            role = %request.role.id(),
            routed = self.has_route(request.role.id()),
            "routing request"
        );
        worker.invoke(request, ctx).await
    }
}
