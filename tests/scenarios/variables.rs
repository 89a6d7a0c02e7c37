//! Test: variable store semantics

use crate::helpers::*;
use provision::core::ExecutionStatus;
use serde_json::json;

/// Every entry of a batch sees the store as it was before the step
#[tokio::test]
async fn test_batch_assignment_is_atomic() {
    let yaml = r#"
variables:
  a: old
steps:
  - method: local.set
    params:
      a: new
      b: "{{local.a}}"
      c: "{{a}}-suffix"
"#;
    let result = run(yaml, &MockExecutor::new()).await;

    assert_eq!(result.var("a"), Some(&json!("new")));
    assert_eq!(result.var("b"), Some(&json!("old")));
    assert_eq!(result.var("c"), Some(&json!("old-suffix")));
}

/// Whole-placeholder values keep their type, nested values resolve leaf by leaf
#[tokio::test]
async fn test_typed_and_structured_values() {
    let yaml = r#"
variables:
  port: 7860
steps:
  - method: local.set
    params:
      next_port: "{{port + 1}}"
      is_nvidia: "{{gpu === 'nvidia'}}"
      launch:
        args: ["--port", "{{port}}", "--listen"]
        title: "UI on {{port}}"
"#;
    let result = run(yaml, &MockExecutor::new()).await;

    assert_eq!(result.var("next_port"), Some(&json!(7861)));
    assert_eq!(result.var("is_nvidia"), Some(&json!(true)));
    assert_eq!(
        result.var("launch"),
        Some(&json!({ "args": ["--port", 7860, "--listen"], "title": "UI on 7860" }))
    );
}

/// Command-line overrides beat document defaults
#[tokio::test]
async fn test_overrides_win_over_defaults() {
    let yaml = r#"
variables:
  venv: env
  torch: "2.1.0"
steps:
  - method: shell.run
    params: { message: "pip install torch=={{torch}}", venv: "{{venv}}" }
"#;
    let executor = MockExecutor::new();
    let mut ctx = linux_context();
    ctx.variables.set("torch", json!("2.3.1"));
    let result = run_in(yaml, &executor, InMemoryLoader::new(), ctx).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert_eq!(executor.commands(), vec!["pip install torch==2.3.1"]);
    assert_eq!(executor.requests()[0].venv.as_deref(), Some("env"));
}

/// Reassignment overwrites
#[tokio::test]
async fn test_reassignment_overwrites() {
    let yaml = r#"
steps:
  - method: local.set
    params: { stage: one }
  - method: local.set
    params: { stage: "{{stage}}-two" }
"#;
    let result = run(yaml, &MockExecutor::new()).await;
    assert_eq!(result.var("stage"), Some(&json!("one-two")));
}
