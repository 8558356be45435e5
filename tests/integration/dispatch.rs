//! Tiered dispatch end to end.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tierflow::config::TimeoutPolicy;
use tierflow::core::{FailureCause, NodeId, NodeStatus, Payload, TaskBatch};
use tierflow::orchestration::{Slice, WorkRequest};
use tierflow::registry::Operation;
use tierflow::Error;

use crate::fixtures::{dispatcher, role, Script, ScriptedWorker};

fn scenario_c() -> WorkRequest {
    WorkRequest::new("add favorites")
        .with_slice(Slice::new("a", role("implementer"), "create entity"))
        .with_slice(Slice::new("b", role("implementer"), "wire feature").needs("a"))
        .with_slice(Slice::new("c", role("writer"), "write copy"))
}

#[tokio::test]
async fn test_independent_nodes_share_first_batch() {
    let worker = Arc::new(ScriptedWorker::new());
    let outcome = dispatcher(worker.clone())
        .dispatch(&role("feature-lead"), &scenario_c())
        .await
        .unwrap();

    assert_eq!(
        outcome.batches,
        vec![
            TaskBatch {
                depth: 0,
                nodes: vec![NodeId::new("a"), NodeId::new("c")],
            },
            TaskBatch {
                depth: 1,
                nodes: vec![NodeId::new("b")],
            },
        ]
    );
    assert!(outcome.is_success());

    let started = worker.started();
    let first: HashSet<&str> = started[..2].iter().map(String::as_str).collect();
    assert_eq!(first, HashSet::from(["a", "c"]));
    assert_eq!(started[2], "b");
}

#[tokio::test]
async fn test_failed_dependency_blocks_only_its_dependents() {
    let worker = Arc::new(ScriptedWorker::new().script("a", Script::failing("schema invalid")));
    let outcome = dispatcher(worker.clone())
        .dispatch(&role("feature-lead"), &scenario_c())
        .await
        .unwrap();

    assert_eq!(
        outcome.status("a"),
        Some(&NodeStatus::Failed {
            cause: FailureCause::Worker {
                message: "schema invalid".to_string()
            }
        })
    );
    assert_eq!(
        outcome.status("b"),
        Some(&NodeStatus::Failed {
            cause: FailureCause::BlockedByDependency {
                dependency: NodeId::new("a")
            }
        })
    );
    assert_eq!(outcome.status("c"), Some(&NodeStatus::Succeeded));
    assert!(!worker.started().contains(&"b".to_string()));
    assert!(!outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_aggregation_ignores_completion_order() {
    let slow_a = Arc::new(
        ScriptedWorker::new()
            .script("a", Script::after(Duration::from_millis(50)))
            .script("c", Script::after(Duration::from_millis(5))),
    );
    let slow_c = Arc::new(
        ScriptedWorker::new()
            .script("a", Script::after(Duration::from_millis(5)))
            .script("c", Script::after(Duration::from_millis(50))),
    );

    let first = dispatcher(slow_a.clone())
        .dispatch(&role("feature-lead"), &scenario_c())
        .await
        .unwrap();
    let second = dispatcher(slow_c.clone())
        .dispatch(&role("feature-lead"), &scenario_c())
        .await
        .unwrap();

    assert_eq!(&slow_a.finished()[..2], ["c", "a"]);
    assert_eq!(&slow_c.finished()[..2], ["a", "c"]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_cycle_rejected_before_dispatch() {
    let worker = Arc::new(ScriptedWorker::new());
    let request = WorkRequest::new("loop")
        .with_slice(Slice::new("a", role("implementer"), "a").needs("b"))
        .with_slice(Slice::new("b", role("implementer"), "b").needs("a"))
        .with_slice(Slice::new("c", role("writer"), "c"));

    let err = dispatcher(worker.clone())
        .dispatch(&role("feature-lead"), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Graph(_)));
    assert!(worker.started().is_empty());
}

#[tokio::test]
async fn test_specialist_cannot_own_a_request() {
    let worker = Arc::new(ScriptedWorker::new());
    let request = WorkRequest::new("x").with_slice(Slice::new("a", role("writer"), "a"));

    let err = dispatcher(worker.clone())
        .dispatch(&role("implementer"), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DepthExceeded { tier: 2, .. }));
    assert!(worker.started().is_empty());
}

#[tokio::test]
async fn test_specialist_subtasks_rejected_at_build() {
    let worker = Arc::new(ScriptedWorker::new());
    let request = WorkRequest::new("x").with_slice(
        Slice::new("impl", role("implementer"), "build it")
            .with_subtask(Slice::new("deeper", role("writer"), "nope")),
    );

    let err = dispatcher(worker.clone())
        .dispatch(&role("feature-lead"), &request)
        .await
        .unwrap_err();

    match err {
        Error::DepthExceeded { role, tier } => {
            assert_eq!(role, "implementer");
            assert_eq!(tier, 2);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(worker.started().is_empty());
}

#[tokio::test]
async fn test_specialist_dynamic_spawn_aborts_run() {
    let nested = WorkRequest::new("deeper").with_slice(Slice::new("x", role("writer"), "x"));
    let worker = Arc::new(ScriptedWorker::new().script("scan", Script::spawning(nested)));
    let request = WorkRequest::new("x")
        .with_slice(Slice::new("scan", role("code-scout"), "scan"))
        .with_slice(Slice::new("after", role("writer"), "after").needs("scan"));

    let err = dispatcher(worker.clone())
        .dispatch(&role("feature-lead"), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DepthExceeded { ref role, tier: 2 } if role == "code-scout"));
    assert_eq!(worker.started(), ["scan"]);
}

#[tokio::test(start_paused = true)]
async fn test_nested_writers_do_not_overlap() {
    let worker = Arc::new(
        ScriptedWorker::new()
            .script("wx", Script::after(Duration::from_millis(50)))
            .script("wy", Script::after(Duration::from_millis(50))),
    );
    let request = WorkRequest::new("two features")
        .with_slice(
            Slice::new("x", role("feature-lead"), "x")
                .with_subtask(Slice::new("wx", role("implementer"), "wx").writes("src/model.ts")),
        )
        .with_slice(
            Slice::new("y", role("feature-lead"), "y")
                .with_subtask(Slice::new("wy", role("implementer"), "wy").writes("src/model.ts")),
        );

    let outcome = dispatcher(worker.clone())
        .dispatch(&role("orchestrator"), &request)
        .await
        .unwrap();

    assert_eq!(
        outcome.batches,
        vec![
            TaskBatch {
                depth: 0,
                nodes: vec![NodeId::new("x")],
            },
            TaskBatch {
                depth: 1,
                nodes: vec![NodeId::new("y")],
            },
        ]
    );
    assert!(outcome.is_success());
    // wx finishes before wy starts.
    assert_eq!(worker.started(), ["wx", "wy"]);
    assert_eq!(worker.finished(), ["wx", "wy"]);
}

#[tokio::test]
async fn test_spawn_needs_granted_task_spawn() {
    let nested = WorkRequest::new("copy").with_slice(Slice::new("leaf", role("writer"), "x"));
    let worker = Arc::new(ScriptedWorker::new().script("lead", Script::spawning(nested)));
    let mut lead = Slice::new("lead", role("feature-lead"), "go");
    lead.operations.insert(Operation::FileRead);
    let request = WorkRequest::new("x").with_slice(lead);

    let err = dispatcher(worker.clone())
        .dispatch(&role("orchestrator"), &request)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::OperationDenied { ref role, ref operation }
            if role == "feature-lead" && operation == "task-spawn"
    ));
    assert_eq!(worker.started(), ["lead"]);
}

#[tokio::test]
async fn test_declared_subtasks_need_granted_task_spawn() {
    let worker = Arc::new(ScriptedWorker::new());
    let mut lead = Slice::new("lead", role("feature-lead"), "split")
        .with_subtask(Slice::new("x", role("implementer"), "x"));
    lead.operations.insert(Operation::FileRead);
    let request = WorkRequest::new("x").with_slice(lead);

    let err = dispatcher(worker.clone())
        .dispatch(&role("orchestrator"), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OperationDenied { .. }));
    assert!(worker.started().is_empty());
}

#[tokio::test]
async fn test_declared_subtasks_run_as_nested_batch() {
    let worker = Arc::new(ScriptedWorker::new());
    let request = WorkRequest::new("ship favorites").with_slice(
        Slice::new("lead", role("feature-lead"), "split the feature")
            .with_subtask(Slice::new("x", role("implementer"), "entity"))
            .with_subtask(Slice::new("y", role("writer"), "copy").needs("x")),
    );

    let outcome = dispatcher(worker.clone())
        .dispatch(&role("orchestrator"), &request)
        .await
        .unwrap();

    assert_eq!(outcome.status("lead"), Some(&NodeStatus::Succeeded));
    let Some(Payload::Nested(nested)) = &outcome.get(&NodeId::new("lead")).unwrap().result else {
        panic!("expected nested outcome");
    };
    assert!(nested.is_success());
    assert_eq!(nested.batches.len(), 2);
    assert_eq!(worker.started(), ["x", "y"]);
}

#[tokio::test]
async fn test_coordinator_dynamic_spawn() {
    let dimensions = WorkRequest::new("research")
        .with_slice(Slice::new("market", role("code-scout"), "market"))
        .with_slice(Slice::new("tech", role("code-scout"), "tech"));
    let worker = Arc::new(ScriptedWorker::new().script("research", Script::spawning(dimensions)));
    let request =
        WorkRequest::new("x").with_slice(Slice::new("research", role("research-lead"), "go"));

    let outcome = dispatcher(worker.clone())
        .dispatch(&role("orchestrator"), &request)
        .await
        .unwrap();

    let Some(Payload::Nested(nested)) = &outcome.get(&NodeId::new("research")).unwrap().result
    else {
        panic!("expected nested outcome");
    };
    assert_eq!(nested.batches.len(), 1);
    assert_eq!(nested.len(), 2);
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_failed_child_fails_coordinator() {
    let worker = Arc::new(ScriptedWorker::new().script("x", Script::failing("boom")));
    let request = WorkRequest::new("x").with_slice(
        Slice::new("lead", role("feature-lead"), "split")
            .with_subtask(Slice::new("x", role("implementer"), "x"))
            .with_subtask(Slice::new("y", role("writer"), "y")),
    );

    let outcome = dispatcher(worker)
        .dispatch(&role("orchestrator"), &request)
        .await
        .unwrap();

    assert_eq!(
        outcome.status("lead"),
        Some(&NodeStatus::Failed {
            cause: FailureCause::ChildFailures { failed: 1 }
        })
    );
    let report = outcome.get(&NodeId::new("lead")).unwrap();
    assert!(matches!(report.result, Some(Payload::Nested(_))));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_a_failed_status_not_a_hang() {
    let worker = Arc::new(
        ScriptedWorker::new().script("slow", Script::after(Duration::from_secs(600))),
    );
    let mut slow = Slice::new("slow", role("implementer"), "slow");
    slow.timeout_secs = Some(1);
    let request = WorkRequest::new("x")
        .with_slice(slow)
        .with_slice(Slice::new("fast", role("writer"), "fast"));

    let outcome = dispatcher(worker)
        .dispatch(&role("feature-lead"), &request)
        .await
        .unwrap();

    assert_eq!(
        outcome.status("slow"),
        Some(&NodeStatus::Failed {
            cause: FailureCause::TimedOut {
                after: Duration::from_secs(1)
            }
        })
    );
    assert_eq!(outcome.status("fast"), Some(&NodeStatus::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn test_requested_timeout_capped_by_policy() {
    let worker = Arc::new(
        ScriptedWorker::new().script("slow", Script::after(Duration::from_secs(30))),
    );
    let mut slow = Slice::new("slow", role("implementer"), "slow");
    slow.timeout_secs = Some(3600);
    let request = WorkRequest::new("x").with_slice(slow);

    let outcome = dispatcher(worker)
        .with_timeouts(TimeoutPolicy::new(
            Duration::from_secs(2),
            Duration::from_secs(5),
        ))
        .dispatch(&role("feature-lead"), &request)
        .await
        .unwrap();

    assert_eq!(
        outcome.status("slow"),
        Some(&NodeStatus::Failed {
            cause: FailureCause::TimedOut {
                after: Duration::from_secs(5)
            }
        })
    );
}

#[tokio::test]
async fn test_disallowed_operation_rejected() {
    let worker = Arc::new(ScriptedWorker::new());
    let mut copy = Slice::new("copy", role("writer"), "copy");
    copy.operations.insert(Operation::ShellExec);
    let request = WorkRequest::new("x").with_slice(copy);

    let err = dispatcher(worker.clone())
        .dispatch(&role("feature-lead"), &request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OperationDenied { .. }));
    assert!(worker.started().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_waits_for_running_batch() {
    let worker = Arc::new(
        ScriptedWorker::new().script("a", Script::after(Duration::from_millis(100))),
    );
    let dispatcher = dispatcher(worker.clone());
    let token = dispatcher.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    let outcome = dispatcher
        .dispatch(&role("feature-lead"), &scenario_c())
        .await
        .unwrap();

    assert_eq!(outcome.status("a"), Some(&NodeStatus::Succeeded));
    assert_eq!(outcome.status("c"), Some(&NodeStatus::Succeeded));
    assert_eq!(
        outcome.status("b"),
        Some(&NodeStatus::Failed {
            cause: FailureCause::Cancelled
        })
    );
    assert!(!worker.started().contains(&"b".to_string()));
}
