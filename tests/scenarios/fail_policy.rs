//! Test: fail-stop and fail-soft

use crate::helpers::*;
use provision::core::{ErrorKind, ExecutionStatus, StepState};
use provision::execution::{ExecutionEvent, StepOutcomeKind};

/// A patch that is already applied fails softly and the run goes on
#[tokio::test]
async fn test_fail_soft_patch_step() {
    let yaml = r#"
steps:
  - id: patch
    method: shell.run
    continue_on_error: true
    params: { message: "git apply fix.patch" }
  - id: install
    method: shell.run
    params: { message: "pip install -e ." }
"#;
    let executor = MockExecutor::new().fail("git apply", "error: patch does not apply");
    let result = run(yaml, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert!(matches!(result.step_state("patch"), StepState::FailedSoft { .. }));
    assert!(matches!(result.step_state("install"), StepState::Succeeded { .. }));
    assert_eq!(
        result.report.record_for(0).map(|r| r.outcome),
        Some(StepOutcomeKind::FailedSoft)
    );
    assert!(result.report.failure.is_none());
    assert!(result
        .events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepFailedSoft { .. })));
}

/// A fatal failure prevents every later step
#[tokio::test]
async fn test_fail_stop_prevents_later_steps() {
    let yaml = r#"
steps:
  - id: clone
    method: shell.run
    params: { message: "git clone https://example.invalid/repo" }
  - id: build
    method: shell.run
    params: { message: "make" }
  - id: note
    method: log
    params: { text: "never" }
"#;
    let executor = MockExecutor::new().fail("git clone", "fatal: unable to access");
    let result = run(yaml, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Failed);
    assert!(matches!(result.step_state("clone"), StepState::Failed { .. }));
    assert!(matches!(result.step_state("build"), StepState::Pending));
    assert!(matches!(result.step_state("note"), StepState::Pending));
    assert_eq!(executor.commands().len(), 1);

    let failure = result.report.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::ExternalCommand);
    assert_eq!(failure.step.label.as_deref(), Some("clone"));
}

/// Configuration errors are fatal even on fail-soft steps
#[tokio::test]
async fn test_dynamic_jump_to_unknown_label_is_fatal() {
    let yaml = r#"
variables:
  target: nowhere
steps:
  - method: jump
    continue_on_error: true
    params: { id: "{{target}}" }
  - method: log
    params: { text: "never" }
"#;
    let result = run(yaml, &MockExecutor::new()).await;

    assert_eq!(result.report.status, ExecutionStatus::Failed);
    assert_eq!(
        result.report.failure.as_ref().map(|f| f.kind),
        Some(ErrorKind::Configuration)
    );
    assert!(result.logs().is_empty());
}
