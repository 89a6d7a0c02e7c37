//! Test: nested pipelines

use crate::helpers::*;
use provision::core::{ErrorKind, ExecutionStatus, StepState};
use provision::execution::StepOutcomeKind;
use serde_json::json;

const TORCH: &str = r#"
name: torch
steps:
  - method: shell.run
    params:
      venv: "{{args.venv}}"
      message: "pip install torch {{args.cuda ? '--index-url https://download.pytorch.org/whl/cu121' : ''}}"
  - method: local.set
    params:
      torch_installed: true
"#;

#[tokio::test]
async fn test_subpipeline_receives_params_and_shares_store() {
    let yaml = r#"
steps:
  - id: torch
    method: script.start
    params:
      uri: torch.yaml
      params:
        venv: env
        cuda: "{{gpu === 'nvidia'}}"
  - id: after
    method: log
    params: { text: "torch={{torch_installed}} args=[{{args}}]" }
"#;
    let executor = MockExecutor::new();
    let loader = InMemoryLoader::new().with("torch.yaml", TORCH);
    let result = run_in(yaml, &executor, loader, linux_context()).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert_eq!(
        executor.commands(),
        vec!["pip install torch --index-url https://download.pytorch.org/whl/cu121"]
    );
    assert_eq!(executor.requests()[0].venv.as_deref(), Some("env"));
    assert_eq!(result.var("torch_installed"), Some(&json!(true)));
    assert_eq!(result.logs(), vec!["torch=true args=[]"]);

    let nested: Vec<_> = result.report.records.iter().filter(|r| r.step.depth == 1).collect();
    assert_eq!(nested.len(), 2);
    assert!(nested.iter().all(|r| r.step.pipeline == "torch"));
    assert_eq!(result.report.records.len(), 4);
}

/// A failing nested step fails the invoking step
#[tokio::test]
async fn test_nested_failure_propagates() {
    let yaml = r#"
steps:
  - id: torch
    method: script.start
    params: { uri: torch.yaml, params: { venv: env } }
  - id: after
    method: log
    params: { text: "never" }
"#;
    let executor = MockExecutor::new().fail("pip install torch", "ERROR: out of disk");
    let loader = InMemoryLoader::new().with("torch.yaml", TORCH);
    let result = run_in(yaml, &executor, loader, linux_context()).await;

    assert_eq!(result.report.status, ExecutionStatus::Failed);
    assert!(matches!(result.step_state("torch"), StepState::Failed { .. }));
    assert!(matches!(result.step_state("after"), StepState::Pending));

    let failure = result.report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::ExternalCommand);
    assert_eq!(failure.step.label.as_deref(), Some("torch"));
    assert!(failure.message.contains("torch.yaml"));
    assert!(failure.command.as_deref().unwrap().starts_with("pip install torch"));
    assert!(failure.output.as_deref().unwrap().contains("out of disk"));
}

/// A nested failure can be absorbed by a fail-soft invoking step
#[tokio::test]
async fn test_fail_soft_subpipeline() {
    let yaml = r#"
steps:
  - method: script.start
    continue_on_error: true
    params: { uri: torch.yaml }
  - method: log
    params: { text: "continued" }
"#;
    let executor = MockExecutor::new().fail("pip install torch", "boom");
    let loader = InMemoryLoader::new().with("torch.yaml", TORCH);
    let result = run_in(yaml, &executor, loader, linux_context()).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert_eq!(
        result.report.record_for(0).map(|r| r.outcome),
        Some(StepOutcomeKind::FailedSoft)
    );
    assert_eq!(result.logs(), vec!["continued"]);
}

#[tokio::test]
async fn test_missing_subpipeline_is_configuration_error() {
    let yaml = r#"
steps:
  - method: script.start
    continue_on_error: true
    params: { uri: missing.yaml }
"#;
    let result = run(yaml, &MockExecutor::new()).await;
    assert_eq!(result.report.status, ExecutionStatus::Failed);
    assert_eq!(
        result.report.failure.as_ref().map(|f| f.kind),
        Some(ErrorKind::Configuration)
    );
}

/// Self-recursion stops at the nesting limit instead of overflowing
#[tokio::test]
async fn test_recursion_hits_depth_limit() {
    let recursive = r#"
name: loop
steps:
  - method: script.start
    params: { uri: loop.yaml }
"#;
    let loader = InMemoryLoader::new().with("loop.yaml", recursive);
    let result = run_in(recursive, &MockExecutor::new(), loader, linux_context()).await;

    assert_eq!(result.report.status, ExecutionStatus::Failed);
    let failure = result.report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Configuration);
    assert!(failure.message.contains("nesting"));
    assert_eq!(result.ctx.depth(), 0);
}
