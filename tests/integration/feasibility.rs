//! Feasibility analysis from request to report.

use std::collections::BTreeSet;
use std::sync::Arc;

use tierflow::core::{NodeId, NodeStatus, Payload};
use tierflow::feasibility::{
    analyze, score, Availability, ChecklistEngine, ChecklistItem, DependencyKind,
    FeasibilityReport, FeasibilityStatus, FeatureRequest, ManifestSource, Requirement,
    StaticSnapshot,
};
use tierflow::orchestration::{FeasibilityWorker, RoleRouter, Slice, WorkRequest};
use tierflow::Error;

use crate::fixtures::{dispatcher, role, ScriptedWorker, TestProject};

fn requirement(name: &str, kind: DependencyKind, capabilities: &[&str]) -> Requirement {
    Requirement {
        name: name.to_string(),
        kind,
        capabilities: capabilities.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
    }
}

#[tokio::test]
async fn test_scenario_partial_adapter_is_feasible() {
    let snapshot = StaticSnapshot::new()
        .with("User", DependencyKind::Entity, ["id", "email"])
        .with("favorites", DependencyKind::ApiAdapter, ["list"]);
    let engine = ChecklistEngine::new(Arc::new(snapshot));
    let request = FeatureRequest {
        feature: "favorites".to_string(),
        requirements: vec![
            requirement("User", DependencyKind::Entity, &[]),
            requirement("favorites", DependencyKind::ApiAdapter, &["list", "add"]),
        ],
    };

    let report = analyze(&engine, &request).await.unwrap();

    assert_eq!(report.checklist[0].status, Availability::Available);
    assert_eq!(report.checklist[1].status, Availability::Partial);
    assert!(report.blockers.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.score, 9);
    assert_eq!(report.status, FeasibilityStatus::Feasible);
}

#[tokio::test]
async fn test_scenario_missing_everything_is_blocked() {
    let engine = ChecklistEngine::new(Arc::new(StaticSnapshot::new()));
    let request = FeatureRequest {
        feature: "subscriptions".to_string(),
        requirements: vec![
            requirement("Subscription", DependencyKind::Entity, &[]),
            requirement("iap-sdk", DependencyKind::ExternalPackage, &[]),
            requirement("payments", DependencyKind::ApiAdapter, &[]),
        ],
    };

    let report = analyze(&engine, &request).await.unwrap();

    assert_eq!(report.blockers.len(), 3);
    assert!(report.warnings.is_empty());
    assert_eq!(report.score, 1);
    assert_eq!(report.status, FeasibilityStatus::Blocked);
    assert_eq!(report.recommendation, "Resolve blockers first");
}

#[test]
fn test_score_boundaries() {
    let item = |status| ChecklistItem::new("x", DependencyKind::Entity, status, "");
    let named = |name: &str, status| ChecklistItem::new(name, DependencyKind::Entity, status, "");

    let one_each = score(&[named("a", Availability::Missing), named("b", Availability::Partial)]);
    assert_eq!((one_each.score, one_each.status), (6, FeasibilityStatus::NeedsWork));

    let clean = score(&[item(Availability::Available)]);
    assert_eq!((clean.score, clean.status), (10, FeasibilityStatus::Feasible));

    let exactly_seven = score(&[named("a", Availability::Missing)]);
    assert_eq!(exactly_seven.status, FeasibilityStatus::Feasible);

    let exactly_four = score(&[
        named("a", Availability::Missing),
        named("b", Availability::Missing),
    ]);
    assert_eq!((exactly_four.score, exactly_four.status), (4, FeasibilityStatus::NeedsWork));

    let four_blockers: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| named(n, Availability::Missing))
        .collect();
    assert_eq!(score(&four_blockers).score, 0);
}

#[test]
fn test_conflicting_duplicates_take_worse_status() {
    let report = score(&[
        ChecklistItem::new("User", DependencyKind::Entity, Availability::Available, "present"),
        ChecklistItem::new("User", DependencyKind::Entity, Availability::Partial, "no email"),
    ]);
    assert_eq!(report.checklist.len(), 1);
    assert_eq!(report.checklist[0].status, Availability::Partial);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.infos.len(), 1);
    assert_eq!(report.score, 9);
}

#[test]
fn test_scoring_is_pure() {
    let items = vec![
        ChecklistItem::new("User", DependencyKind::Entity, Availability::Available, ""),
        ChecklistItem::new("sdk", DependencyKind::ExternalPackage, Availability::Missing, ""),
        ChecklistItem::new("api", DependencyKind::ApiAdapter, Availability::Partial, "no add"),
    ];
    let mut reversed = items.clone();
    reversed.reverse();

    let first: FeasibilityReport = score(&items);
    assert_eq!(first, score(&items));
    assert_eq!(first.score, score(&reversed).score);
    assert_eq!(first.status, score(&reversed).status);
}

#[tokio::test]
async fn test_manifest_backed_analysis() {
    let project = TestProject::new(&[(
        "project.toml",
        r#"
[[dependencies]]
name = "User"
kind = "entity"
exposes = ["id"]

[[dependencies]]
name = "http"
kind = "shared_utility"
"#,
    )]);
    let engine = ChecklistEngine::new(Arc::new(ManifestSource::new(
        project.path().join("project.toml"),
    )));
    let request: FeatureRequest = toml::from_str(
        r#"
feature = "profile"

[[requirements]]
name = "User"
kind = "entity"
capabilities = ["id", "avatar"]

[[requirements]]
name = "http"
kind = "shared_utility"
"#,
    )
    .unwrap();

    let report = analyze(&engine, &request).await.unwrap();
    assert_eq!(report.score, 9);
    assert_eq!(report.checklist[0].note, "missing capabilities: avatar");
}

#[tokio::test]
async fn test_missing_manifest_is_configuration_error() {
    let project = TestProject::new(&[]);
    let engine = ChecklistEngine::new(Arc::new(ManifestSource::new(
        project.path().join("absent.toml"),
    )));
    let request = FeatureRequest {
        feature: "x".to_string(),
        requirements: Vec::new(),
    };
    assert!(matches!(
        analyze(&engine, &request).await.unwrap_err(),
        Error::Configuration(_)
    ));
}

#[tokio::test]
async fn test_feasibility_analyst_in_a_dispatch() {
    let snapshot = StaticSnapshot::new().with("User", DependencyKind::Entity, Vec::<String>::new());
    let analyst = FeasibilityWorker::new(ChecklistEngine::new(Arc::new(snapshot)));
    let router = RoleRouter::new(Arc::new(ScriptedWorker::new()))
        .route(role("feasibility-analyst"), Arc::new(analyst));

    let instruction = r#"{"feature": "favorites", "requirements": [
        {"name": "User", "kind": "entity"},
        {"name": "Favorite", "kind": "entity"}
    ]}"#;
    let request = WorkRequest::new("check favorites")
        .with_slice(Slice::new("feasibility", role("feasibility-analyst"), instruction));

    let outcome = dispatcher(Arc::new(router))
        .dispatch(&role("orchestrator"), &request)
        .await
        .unwrap();

    assert_eq!(outcome.status("feasibility"), Some(&NodeStatus::Succeeded));
    let Some(Payload::Structured(value)) =
        &outcome.get(&NodeId::new("feasibility")).unwrap().result
    else {
        panic!("expected structured report");
    };
    let report: FeasibilityReport = serde_json::from_value(value.clone()).unwrap();
    assert_eq!(report.score, 7);
    assert_eq!(report.status, FeasibilityStatus::Feasible);
}
