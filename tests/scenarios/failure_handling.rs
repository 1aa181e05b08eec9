//! Test: Failure Handling - failures propagate to dependents without fail-fast

use crate::helpers::*;
use hop::core::{FailureKind, TaskError};

/// A fails with exit 1; B depends on it and is never executed
#[tokio::test]
async fn test_dependency_failure_blocks_dependent() {
    let yaml = r#"
id: broken
tasks:
  - id: A
    command: exit 1
  - id: B
    command: echo never
    dependsOn: [A]
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_failed(&result);
    assert_task_failed(&result, "A", FailureKind::ExecutionFailure, Some(1));
    assert_task_failed(&result, "B", FailureKind::DependencyFailed, None);
    assert_task_logged(&result, "A", "Exec failed");
    assert_task_logged(&result, "B", "Not started");
    assert_event_lifecycle(&result);

    assert_eq!(
        result.report.task("B"),
        Some(&Err(TaskError::DependencyFailed { dependency: "A".to_string() }))
    );
}

/// Non-zero exit codes are reported as the generic failure code
#[tokio::test]
async fn test_nonzero_exit_reported_as_failure() {
    let yaml = r#"
id: exit-seven
tasks:
  - id: A
    command: exit 7
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_failed(&result);
    assert_task_failed(&result, "A", FailureKind::ExecutionFailure, Some(1));
    match result.report.task("A") {
        Some(Err(TaskError::ExecutionFailure { exit_code, .. })) => assert_eq!(*exit_code, Some(7)),
        other => panic!("Unexpected result for A: {:?}", other),
    }
}

/// Without fail-fast, unrelated branches still run to completion
#[tokio::test]
async fn test_unrelated_branch_completes_without_fail_fast() {
    let yaml = r#"
id: branches
tasks:
  - id: bad
    command: exit 1
  - id: slow
    command: "sleep 0.3; echo finished"
  - id: after_bad
    command: echo never
    dependsOn: [bad]
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_failed(&result);
    assert_task_completed(&result, "slow");
    assert_task_logged(&result, "slow", "finished");
    assert_task_failed(&result, "after_bad", FailureKind::DependencyFailed, None);
    assert_event_lifecycle(&result);
}

#[tokio::test]
async fn test_unknown_command_fails_task() {
    let yaml = r#"
id: missing
tasks:
  - id: A
    command: definitely-not-a-real-command-xyz
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_failed(&result);
    assert_task_failed(&result, "A", FailureKind::ExecutionFailure, Some(1));
}
