//! Test: Success Chain - dependencies run in order and every task completes

use crate::helpers::*;
use hop::core::LogLevel;

/// A -> B -> C all succeed, each starting only after its dependency finished
#[tokio::test]
async fn test_linear_chain_completes_in_order() {
    let yaml = r#"
id: chain
tasks:
  - id: A
    command: echo a
  - id: B
    command: echo b
    dependsOn: [A]
  - id: C
    command: echo c
    dependsOn: [B]
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_completed(&result);
    assert_task_completed(&result, "A");
    assert_task_completed(&result, "B");
    assert_task_completed(&result, "C");
    assert_eq!(result.start_order(), vec!["A", "B", "C"]);
    assert_event_lifecycle(&result);

    // Each dependent starts no earlier than its dependency ended
    assert!(result.finish_time("A") <= result.start_time("B"));
    assert!(result.finish_time("B") <= result.start_time("C"));
}

/// C depends on a slow A and a fast B; it must wait for both to finish
#[tokio::test]
async fn test_fan_in_waits_for_slowest_dependency() {
    let yaml = r#"
id: fan-in
tasks:
  - id: A
    command: "sleep 0.3; echo hi"
  - id: B
    command: echo bye
  - id: C
    command: echo joined
    dependsOn: [A, B]
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_completed(&result);
    assert_task_completed(&result, "C");
    assert_event_lifecycle(&result);

    let c_start = result.start_time("C");
    assert!(result.finish_time("A") <= c_start, "C started before slow A finished");
    assert!(result.finish_time("B") <= c_start, "C started before B finished");
    assert!(result.finish_time("B") < result.finish_time("A"));
}

#[tokio::test]
async fn test_output_streams_as_log_lines() {
    let yaml = r#"
id: logs
tasks:
  - id: talk
    command: "echo one; echo; echo two; echo oops >&2"
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_completed(&result);
    let task = result.task("talk");
    let info: Vec<_> = task
        .logs
        .iter()
        .filter(|(level, _)| *level == LogLevel::Info)
        .map(|(_, line)| line.as_str())
        .collect();
    assert_eq!(info, vec!["one", "two"]);
    assert!(task.logs.contains(&(LogLevel::Error, "oops".to_string())));
}

/// Diamond: D shares B and C's dependency A, which still runs exactly once
#[tokio::test]
async fn test_diamond_runs_shared_dependency_once() {
    let yaml = r#"
id: diamond
tasks:
  - id: A
    command: echo root
  - id: B
    command: sleep 0.1
    dependsOn: [A]
  - id: C
    command: sleep 0.1
    dependsOn: [A]
  - id: D
    command: echo done
    dependsOn: [B, C]
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_completed(&result);
    assert_event_lifecycle(&result);
    let order = result.start_order();
    assert_eq!(order.iter().filter(|id| *id == "A").count(), 1);
    assert_eq!(order.first().map(String::as_str), Some("A"));
    assert_eq!(order.last().map(String::as_str), Some("D"));
}

#[tokio::test]
async fn test_independent_tasks_run_concurrently() {
    let yaml = r#"
id: parallel
tasks:
  - id: one
    command: sleep 0.5
  - id: two
    command: sleep 0.5
  - id: three
    command: sleep 0.5
"#;

    let result = run_yaml(yaml).await;

    assert_pipeline_completed(&result);
    assert!(
        result.elapsed.as_millis() < 1400,
        "Independent tasks took {:?}",
        result.elapsed
    );
}

#[tokio::test]
async fn test_each_run_gets_fresh_ids() {
    let yaml = r#"
id: twice
tasks:
  - id: A
    command: "true"
"#;

    let first = run_yaml(yaml).await;
    let second = run_yaml(yaml).await;

    assert_pipeline_completed(&first);
    assert_pipeline_completed(&second);
    assert_ne!(first.report.run_id, second.report.run_id);
    assert_ne!(first.task("A").task_run_id, second.task("A").task_run_id);
}
