//! Test: starting from a labelled step

use crate::helpers::*;
use provision::core::{ExecutionStatus, PipelineError, StepState};

const INSTALL: &str = r#"
steps:
  - id: clone
    method: shell.run
    params: { message: "git clone repo" }
  - id: deps
    method: shell.run
    params: { message: "pip install -r requirements.txt" }
  - id: launch
    method: log
    params: { text: "ready" }
"#;

#[tokio::test]
async fn test_execute_from_skips_earlier_steps() {
    let executor = MockExecutor::new();
    let mut pipeline = load(INSTALL);
    let mut ctx = linux_context();
    let (engine, _events) = engine_with(executor.clone(), InMemoryLoader::new());

    let report = engine
        .execute_from(&mut pipeline, &mut ctx, "deps")
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(executor.commands(), vec!["pip install -r requirements.txt"]);
    assert!(matches!(pipeline.steps[0].state, StepState::Pending));
    assert_eq!(report.records.len(), 2);
}

#[tokio::test]
async fn test_execute_from_unknown_label() {
    let mut pipeline = load(INSTALL);
    let (engine, _events) = engine_with(MockExecutor::new(), InMemoryLoader::new());

    let err = engine
        .execute_from(&mut pipeline, &mut linux_context(), "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
}
