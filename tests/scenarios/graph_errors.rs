//! Test: Graph Errors - invalid graphs are rejected before anything runs

use hop::core::config::PipelineConfig;
use hop::core::{GraphError, Pipeline, Task};

#[test]
fn test_unknown_dependency_rejected() {
    let tasks = vec![Task::new("A", "echo a").depends_on(["ghost"])];

    let err = Pipeline::new("ghosts", tasks).unwrap_err();

    assert_eq!(
        err,
        GraphError::UnknownDependency {
            task: "A".to_string(),
            dependency: "ghost".to_string(),
        }
    );
    assert_eq!(err.to_string(), "Task 'A' depends on unknown task 'ghost'");
}

#[test]
fn test_cycle_rejected_from_yaml() {
    let yaml = r#"
id: loop
tasks:
  - id: A
    command: echo a
    dependsOn: [B]
  - id: B
    command: echo b
    dependsOn: [A]
"#;

    let err = PipelineConfig::from_yaml(yaml).unwrap_err();

    match err.downcast_ref::<GraphError>() {
        Some(GraphError::CycleDetected { tasks }) => {
            assert_eq!(tasks, &vec!["A".to_string(), "B".to_string()]);
        }
        other => panic!("Expected cycle error, got {:?}", other),
    }
}

#[test]
fn test_valid_graph_has_execution_order() {
    let yaml = r#"
id: ordered
tasks:
  - id: deploy
    command: echo deploy
    depends_on: [test, build]
  - id: build
    command: echo build
  - id: test
    command: echo test
    depends_on: [build]
"#;

    let config = PipelineConfig::from_yaml(yaml).unwrap();

    assert_eq!(config.execution_order().unwrap(), vec!["build", "test", "deploy"]);
}
