//! Test: Fail Fast - the first failure aborts everything still running

use crate::helpers::*;
use hop::core::FailureKind;
use std::time::Duration;

/// A long task is killed as soon as a sibling fails
#[tokio::test]
async fn test_fail_fast_kills_running_task() {
    let yaml = r#"
id: fast
failFast: true
tasks:
  - id: A
    command: sleep 5
  - id: B
    command: exit 1
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_failed(&result);
    assert_task_failed(&result, "B", FailureKind::ExecutionFailure, Some(1));
    assert_task_failed(&result, "A", FailureKind::Aborted, None);
    assert!(
        result.elapsed < Duration::from_secs(3),
        "Abort took {:?}",
        result.elapsed
    );
    assert_event_lifecycle(&result);
}

/// Tasks waiting on dependencies never start after an abort
#[tokio::test]
async fn test_fail_fast_stops_waiting_tasks() {
    let yaml = r#"
id: fast-wait
failFast: true
tasks:
  - id: slow
    command: sleep 5
  - id: after_slow
    command: echo never
    dependsOn: [slow]
  - id: bad
    command: "sleep 0.1; exit 1"
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_failed(&result);
    assert_task_failed(&result, "bad", FailureKind::ExecutionFailure, Some(1));
    assert_task_failed(&result, "slow", FailureKind::Aborted, None);
    assert_task_failed(&result, "after_slow", FailureKind::Aborted, None);
    assert!(result.elapsed < Duration::from_secs(3));
    assert_event_lifecycle(&result);
}

/// Output written by a descendant after the abort is not waited for
#[tokio::test]
async fn test_fail_fast_does_not_wait_for_descendants() {
    let yaml = r#"
id: fast-pipes
failFast: true
tasks:
  - id: A
    command: "sleep 5; echo done"
  - id: B
    command: "sleep 0.1; false"
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_failed(&result);
    assert_task_failed(&result, "A", FailureKind::Aborted, None);
    assert!(result.elapsed < Duration::from_secs(3));
}
