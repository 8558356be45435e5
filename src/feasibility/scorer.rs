//! Feasibility scorer.
//!
//! `score = clamp(10 - 3 * blockers - warnings, 0, 10)`. The function is
//! pure: the same checklist always yields the same report.

use std::collections::{BTreeSet, HashMap};

use crate::feasibility::types::{
    Availability, ChecklistItem, DependencyKind, Effort, FeasibilityReport, FeasibilityStatus,
    Finding, Severity,
};

const MAX_SCORE: i32 = 10;
const BLOCKER_WEIGHT: i32 = 3;
const WARNING_WEIGHT: i32 = 1;

/// Score a checklist.
pub fn score(items: &[ChecklistItem]) -> FeasibilityReport {
    let (checklist, infos) = merge_duplicates(items);

    let mut blockers = Vec::new();
    let mut warnings = Vec::new();
    for item in &checklist {
        match item.status {
            Availability::Missing => blockers.push(blocker(item)),
            Availability::Partial => warnings.push(warning(item)),
            Availability::Available => {}
        }
    }

    let raw = MAX_SCORE
        - BLOCKER_WEIGHT * blockers.len() as i32
        - WARNING_WEIGHT * warnings.len() as i32;
    let score = raw.clamp(0, MAX_SCORE) as u8;
    let status = FeasibilityStatus::from_score(score);

    FeasibilityReport {
        score,
        status,
        checklist,
        blockers,
        warnings,
        infos,
        recommendation: status.recommendation().to_string(),
    }
}

/// Collapse items that name the same dependency. The worse status wins and
/// every conflict is recorded as an Info finding. Equal statuses fall back to
/// kind then note, so the kept item never depends on input order.
fn merge_duplicates(items: &[ChecklistItem]) -> (Vec<ChecklistItem>, Vec<Finding>) {
    let mut merged: Vec<ChecklistItem> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut seen: HashMap<&str, BTreeSet<Availability>> = HashMap::new();

    for item in items {
        let name = item.dependency_name.as_str();
        seen.entry(name).or_default().insert(item.status);
        match position.get(name) {
            Some(&i) => {
                if rank(item) > rank(&merged[i]) {
                    merged[i] = item.clone();
                }
            }
            None => {
                position.insert(name, merged.len());
                merged.push(item.clone());
            }
        }
    }

    let infos = merged
        .iter()
        .filter_map(|item| {
            let statuses = seen.get(item.dependency_name.as_str())?;
            if statuses.len() < 2 {
                return None;
            }
            let reported: Vec<String> = statuses.iter().map(ToString::to_string).collect();
            Some(Finding {
                severity: Severity::Info,
                description: format!(
                    "{} reported with conflicting statuses: {}",
                    item.dependency_name,
                    reported.join(", ")
                ),
                resolution: format!("Treated as {}", item.status),
                estimated_effort: None,
            })
        })
        .collect();

    (merged, infos)
}

fn rank(item: &ChecklistItem) -> (Availability, DependencyKind, &str) {
    (item.status, item.kind, item.note.as_str())
}

fn blocker(item: &ChecklistItem) -> Finding {
    let name = &item.dependency_name;
    let (resolution, effort) = match item.kind {
        DependencyKind::Entity => (format!("Create the {} entity", name), Effort::Medium),
        DependencyKind::SharedUtility => {
            (format!("Implement the shared {} utility", name), Effort::Small)
        }
        DependencyKind::ApiAdapter => {
            (format!("Build the {} API adapter", name), Effort::Medium)
        }
        DependencyKind::ExternalPackage => (
            format!("Add the {} package and configure it", name),
            Effort::Large,
        ),
    };
    Finding {
        severity: Severity::Blocker,
        description: format!("{} {} is missing", item.kind, name),
        resolution,
        estimated_effort: Some(effort),
    }
}

fn warning(item: &ChecklistItem) -> Finding {
    Finding {
        severity: Severity::Warning,
        description: format!("{} {} is incomplete: {}", item.kind, item.dependency_name, item.note),
        resolution: format!("Extend {} before relying on it", item.dependency_name),
        estimated_effort: Some(Effort::Small),
    }
}
