//! Test: jump steps

use crate::helpers::*;
use provision::core::{config::PipelineConfig, ExecutionStatus, StepState};
use provision::execution::ExecutionEvent;
use serde_json::json;

/// A backward jump loops until the guard turns false
#[tokio::test]
async fn test_backward_jump_loop() {
    let yaml = r#"
variables:
  attempt: 0
steps:
  - id: retry
    method: local.set
    params: { attempt: "{{attempt + 1}}" }
  - method: shell.run
    params: { message: "download --try {{attempt}}" }
  - method: jump
    when: "{{attempt < 3}}"
    params: { id: retry }
  - id: done
    method: log
    params: { text: "finished after {{attempt}}" }
"#;
    let executor = MockExecutor::new();
    let result = run(yaml, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert_eq!(
        executor.commands(),
        vec!["download --try 1", "download --try 2", "download --try 3"]
    );
    assert_eq!(result.var("attempt"), Some(&json!(3)));
    assert_eq!(result.logs(), vec!["finished after 3"]);
    let jumps = result
        .events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::Jumped { .. }))
        .count();
    assert_eq!(jumps, 2);
}

/// A forward jump skips the steps in between without marking them
#[tokio::test]
async fn test_forward_jump_with_computed_target() {
    let yaml = r#"
steps:
  - method: jump
    params: { id: "{{platform === 'linux' ? 'linux' : 'other'}}" }
  - id: other
    method: log
    params: { text: "other" }
  - id: linux
    method: log
    params: { text: "linux" }
"#;
    let result = run(yaml, &MockExecutor::new()).await;

    assert_eq!(result.logs(), vec!["linux"]);
    assert!(matches!(result.step_state("other"), StepState::Pending));
}

#[test]
fn test_unknown_literal_target_rejected_at_load() {
    let yaml = r#"
steps:
  - method: jump
    params: { id: nowhere }
"#;
    assert!(PipelineConfig::from_yaml(yaml).is_err());
}

#[test]
fn test_unknown_ternary_target_rejected_at_load() {
    let yaml = r#"
steps:
  - id: start
    method: jump
    params: { id: "{{gpu === 'amd' ? 'start' : 'missing'}}" }
"#;
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    assert!(config.to_pipeline().is_err());
}
