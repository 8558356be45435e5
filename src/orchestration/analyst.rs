//! Worker that answers feasibility questions in-process.

use async_trait::async_trait;
use tracing::info;

use crate::core::Payload;
use crate::error::Result;
use crate::feasibility::{self, ChecklistEngine, FeatureRequest};
use crate::orchestration::dispatcher::SpawnContext;
use crate::orchestration::worker::{Worker, WorkerRequest, WorkerResponse};

/// Parses the instruction as a feature request (JSON or TOML), runs the
/// checklist and scorer, and returns the report as structured data.
pub struct FeasibilityWorker {
    engine: ChecklistEngine,
}

impl FeasibilityWorker {
    pub fn new(engine: ChecklistEngine) -> Self {
        Self { engine }
    }

    fn parse(instruction: &str) -> std::result::Result<FeatureRequest, String> {
        serde_json::from_str::<FeatureRequest>(instruction)
            .or_else(|json| toml::from_str(instruction).map_err(|toml| (json, toml)))
            .map_err(|(json, toml)| {
                format!("invalid feature request: json: {}; toml: {}", json, toml)
            })
    }
}

#[async_trait]
impl Worker for FeasibilityWorker {
    async fn invoke(&self, request: WorkerRequest, _ctx: SpawnContext) -> Result<WorkerResponse> {
        let feature = match Self::parse(&request.instruction) {
            Ok(feature) => feature,
            Err(message) => return Ok(WorkerResponse::failed(message)),
        };

        // An unreachable snapshot is a configuration error and aborts the run.
        let report = feasibility::analyze(&self.engine, &feature).await?;
        info!(
            node = %request.node,
            feature = %feature.feature,
            score = report.score,
            status = %report.status,
            "feasibility scored"
        );
        Ok(WorkerResponse::succeeded(Some(Payload::Structured(
            serde_json::to_value(&report)?,
        ))))
    }
}
