//! Validation gate driven by dispatch outcomes.

use std::sync::Arc;

use tierflow::core::NodeId;
use tierflow::orchestration::{Slice, WorkRequest};
use tierflow::workflow::{
    detect, GateDecision, GatePhase, StepKind, StepSpec, StepStatus, ValidationGate,
};
use tierflow::Error;

use crate::fixtures::{dispatcher, role, Script, ScriptedRunner, ScriptedWorker, TestProject};

const EXPO_PACKAGE: &str = r#"{
    "name": "app",
    "scripts": {"lint": "eslint .", "test": "jest"},
    "dependencies": {"expo": "~52.0.0"},
    "devDependencies": {"typescript": "^5.3.0"}
}"#;

fn feature_request() -> WorkRequest {
    WorkRequest::new("favorites")
        .with_slice(Slice::new("entity", role("implementer"), "entity"))
        .with_slice(Slice::new("screen", role("implementer"), "screen").needs("entity"))
}

#[tokio::test]
async fn test_failed_outcome_holds_gate() {
    let worker = Arc::new(ScriptedWorker::new().script("entity", Script::failing("no schema")));
    let outcome = dispatcher(worker)
        .dispatch(&role("feature-lead"), &feature_request())
        .await
        .unwrap();
    let runner = ScriptedRunner::new();
    let project = TestProject::new(&[("Cargo.toml", "")]);

    let mut gate = ValidationGate::default();
    let decision = gate.consume(&outcome, &runner, project.path()).await.unwrap();

    assert_eq!(
        decision,
        GateDecision::Held {
            failed: vec![NodeId::new("entity"), NodeId::new("screen")]
        }
    );
    assert_eq!(gate.current_phase(), GatePhase::Red);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_successful_outcome_validates_and_advances() {
    let outcome = dispatcher(Arc::new(ScriptedWorker::new()))
        .dispatch(&role("feature-lead"), &feature_request())
        .await
        .unwrap();
    let project = TestProject::new(&[("package.json", EXPO_PACKAGE), ("yarn.lock", "")]);
    let runner = ScriptedRunner::new()
        .pass("tsc")
        .pass("lint")
        .pass("test")
        .pass("expo-doctor");

    let mut gate = ValidationGate::default();
    let decision = gate.consume(&outcome, &runner, project.path()).await.unwrap();

    let GateDecision::Validated(run) = decision else {
        panic!("expected a validation run");
    };
    assert!(run.passed());
    assert_eq!(runner.calls(), ["tsc", "lint", "test", "expo-doctor"]);
    assert_eq!(gate.current_phase(), GatePhase::Refactor);

    gate.transition(GatePhase::Red).unwrap();
    assert_eq!(gate.current_phase(), GatePhase::Red);
}

#[tokio::test]
async fn test_lint_failure_skips_tail_and_surfaces_output() {
    let project = TestProject::new(&[("package.json", EXPO_PACKAGE), ("yarn.lock", "")]);
    let runner = ScriptedRunner::new()
        .pass("tsc")
        .fail("lint", "src/Favorites.tsx:12:5  error  'x' is unused\n");

    let mut gate = ValidationGate::default();
    gate.transition(GatePhase::Green).unwrap();
    let run = gate.validate(&runner, project.path()).await.unwrap();

    let statuses: Vec<StepStatus> = run.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        [
            StepStatus::Pass,
            StepStatus::Fail,
            StepStatus::Skipped,
            StepStatus::Skipped
        ]
    );
    assert_eq!(runner.calls(), ["tsc", "lint"]);
    assert_eq!(gate.current_phase(), GatePhase::Green);

    match run.ensure_passed().unwrap_err() {
        Error::ValidationStepFailure { step, output } => {
            assert_eq!(step, "lint");
            assert_eq!(output, "src/Favorites.tsx:12:5  error  'x' is unused\n");
        }
        other => panic!("unexpected error: {}", other),
    }

    // A later clean run is allowed from Green.
    let retry = ScriptedRunner::new()
        .pass("tsc")
        .pass("lint")
        .pass("test")
        .pass("expo-doctor");
    assert!(gate.validate(&retry, project.path()).await.unwrap().passed());
    assert_eq!(gate.current_phase(), GatePhase::Refactor);
}

#[tokio::test]
async fn test_configured_steps_override_synthesis() {
    let project = TestProject::new(&[("Cargo.toml", "")]);
    let steps = vec![
        StepSpec::new("fmt", StepKind::Lint, "cargo", &["fmt", "--check"]),
        StepSpec::new("nextest", StepKind::Test, "cargo", &["nextest", "run"]),
    ];
    let runner = ScriptedRunner::new().pass("fmt").pass("nextest");

    let mut gate = ValidationGate::new(steps);
    gate.transition(GatePhase::Green).unwrap();
    let run = gate.validate(&runner, project.path()).await.unwrap();

    assert!(run.passed());
    assert_eq!(runner.calls(), ["fmt", "nextest"]);
    assert_eq!(run.steps[1].command, "cargo nextest run");
}

#[test]
fn test_synthesis_is_idempotent() {
    let project = TestProject::new(&[
        ("package.json", EXPO_PACKAGE),
        ("pnpm-lock.yaml", ""),
        ("pyproject.toml", "[project]\nname = \"svc\"\n"),
    ]);
    let first = detect(project.path()).unwrap();
    let second = detect(project.path()).unwrap();
    assert_eq!(first, second);
    let kinds: Vec<StepKind> = first.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        [
            StepKind::TypeCheck,
            StepKind::Lint,
            StepKind::Test,
            StepKind::Doctor,
            StepKind::TypeCheck,
            StepKind::Lint,
            StepKind::Test
        ]
    );
}

#[tokio::test]
async fn test_consume_in_refactor_is_rejected() {
    let outcome = dispatcher(Arc::new(ScriptedWorker::new()))
        .dispatch(&role("feature-lead"), &feature_request())
        .await
        .unwrap();
    let project = TestProject::new(&[("Cargo.toml", "")]);
    let runner = ScriptedRunner::new()
        .pass("cargo check")
        .pass("cargo clippy")
        .pass("cargo test");

    let mut gate = ValidationGate::default();
    gate.consume(&outcome, &runner, project.path()).await.unwrap();
    assert_eq!(gate.current_phase(), GatePhase::Refactor);

    let err = gate
        .consume(&outcome, &runner, project.path())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPhaseTransition { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_runner_end_to_end() {
    use std::time::Duration;
    use tierflow::workflow::CommandRunner;

    let project = TestProject::new(&[]);
    let steps = vec![
        StepSpec::new("ok", StepKind::Custom, "sh", &["-c", "echo fine"]),
        StepSpec::new("broken", StepKind::Custom, "sh", &["-c", "echo bad >&2; exit 2"]),
        StepSpec::new("never", StepKind::Custom, "sh", &["-c", "touch never-ran"]),
    ];
    let runner = CommandRunner::new(project.path().to_path_buf(), Duration::from_secs(10));

    let mut gate = ValidationGate::new(steps);
    gate.transition(GatePhase::Green).unwrap();
    let run = gate.validate(&runner, project.path()).await.unwrap();

    assert_eq!(run.steps[0].output, "fine\n");
    assert_eq!(run.steps[1].exit_code, Some(2));
    assert_eq!(run.steps[1].output, "bad\n");
    assert_eq!(run.steps[2].status, StepStatus::Skipped);
    assert!(!project.path().join("never-ran").exists());
}
