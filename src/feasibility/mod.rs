//! Feasibility analysis: classify a feature's prerequisites against the
//! project and turn the checklist into a go/no-go score.

pub mod checklist;
pub mod scorer;
pub mod snapshot;
mod types;

pub use checklist::{check, ChecklistEngine};
pub use scorer::score;
pub use snapshot::{ManifestSource, ProbeResult, ProjectSnapshot, SnapshotSource, StaticSnapshot};
pub use types::{
    Availability, ChecklistItem, DependencyKind, Effort, FeasibilityReport, FeasibilityStatus,
    FeatureRequest, Finding, Requirement, Severity,
};

use crate::error::Result;

/// Evaluate a feature request end to end.
pub async fn analyze(
    engine: &ChecklistEngine,
    request: &FeatureRequest,
) -> Result<FeasibilityReport> {
    let items = engine.evaluate(request).await?;
    Ok(score(&items))
}
