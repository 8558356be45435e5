//! Data model shared by the checklist engine and the scorer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of prerequisite a feature relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Entity,
    SharedUtility,
    ApiAdapter,
    ExternalPackage,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::Entity => write!(f, "Entity"),
            DependencyKind::SharedUtility => write!(f, "Shared utility"),
            DependencyKind::ApiAdapter => write!(f, "API adapter"),
            DependencyKind::ExternalPackage => write!(f, "External package"),
        }
    }
}

/// Availability of one prerequisite. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Partial,
    Missing,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Available => write!(f, "Available"),
            Availability::Partial => write!(f, "Partial"),
            Availability::Missing => write!(f, "Missing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub dependency_name: String,
    pub kind: DependencyKind,
    pub status: Availability,
    pub note: String,
}

impl ChecklistItem {
    pub fn new(name: &str, kind: DependencyKind, status: Availability, note: &str) -> Self {
        Self {
            dependency_name: name.to_string(),
            kind,
            status,
            note: note.to_string(),
        }
    }
}

/// One prerequisite of a feature, with the capabilities it must expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    pub kind: DependencyKind,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

/// A feature to check, as loaded from a request file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRequest {
    pub feature: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocker,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Small,
    Medium,
    Large,
}

impl std::fmt::Display for Effort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effort::Small => write!(f, "small"),
            Effort::Medium => write!(f, "medium"),
            Effort::Large => write!(f, "large"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub description: String,
    pub resolution: String,
    pub estimated_effort: Option<Effort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeasibilityStatus {
    Feasible,
    NeedsWork,
    Blocked,
}

impl FeasibilityStatus {
    /// Thresholds: 7 and up is Feasible, 4 to 6 NeedsWork, below 4 Blocked.
    pub fn from_score(score: u8) -> Self {
        match score {
            7.. => FeasibilityStatus::Feasible,
            4..=6 => FeasibilityStatus::NeedsWork,
            _ => FeasibilityStatus::Blocked,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            FeasibilityStatus::Feasible => "Proceed with implementation",
            FeasibilityStatus::NeedsWork => "Address warnings before starting",
            FeasibilityStatus::Blocked => "Resolve blockers first",
        }
    }
}

impl std::fmt::Display for FeasibilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeasibilityStatus::Feasible => write!(f, "FEASIBLE"),
            FeasibilityStatus::NeedsWork => write!(f, "NEEDS WORK"),
            FeasibilityStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Go/no-go verdict. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub score: u8,
    pub status: FeasibilityStatus,
    pub checklist: Vec<ChecklistItem>,
    pub blockers: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub infos: Vec<Finding>,
    pub recommendation: String,
}
