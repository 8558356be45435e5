//! Dependency checklist engine.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::Result;
use crate::feasibility::snapshot::{ProjectSnapshot, SnapshotSource};
use crate::feasibility::types::{Availability, ChecklistItem, FeatureRequest, Requirement};

/// Classifies each requirement of a feature against a project snapshot.
pub struct ChecklistEngine {
    source: Arc<dyn SnapshotSource>,
}

impl ChecklistEngine {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self { source }
    }

    /// Obtain a snapshot and check every requirement against it.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the snapshot cannot be obtained.
    /// An absent dependency is a Missing item, never an error.
    pub async fn evaluate(&self, request: &FeatureRequest) -> Result<Vec<ChecklistItem>> {
        let snapshot = self.source.snapshot().await?;
        let items = check(snapshot.as_ref(), request);
        info!(
            feature = %request.feature,
            requirements = items.len(),
            "checklist evaluated"
        );
        Ok(items)
    }
}

/// One checklist item per requirement, in request order.
pub fn check(snapshot: &dyn ProjectSnapshot, request: &FeatureRequest) -> Vec<ChecklistItem> {
    request
        .requirements
        .iter()
        .map(|req| classify(snapshot, req))
        .collect()
}

fn classify(snapshot: &dyn ProjectSnapshot, req: &Requirement) -> ChecklistItem {
    let probe = snapshot.probe(&req.name, req.kind);
    let (status, note) = if !probe.exists {
        (Availability::Missing, "not found in project".to_string())
    } else {
        let absent: Vec<&str> = req
            .capabilities
            .difference(&probe.exposed)
            .map(String::as_str)
            .collect();
        if absent.is_empty() {
            let note = if req.capabilities.is_empty() {
                "present".to_string()
            } else {
                format!("exposes {}", join(req.capabilities.iter().map(String::as_str)))
            };
            (Availability::Available, note)
        } else {
            (
                Availability::Partial,
                format!("missing capabilities: {}", join(absent.into_iter())),
            )
        }
    };
    debug!(dependency = %req.name, kind = ?req.kind, %status, "classified dependency");
    ChecklistItem {
        dependency_name: req.name.clone(),
        kind: req.kind,
        status,
        note,
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
