//! Test: precondition checks make apply steps safe to re-run

use crate::helpers::*;
use provision::core::{ExecutionStatus, StepState};
use std::sync::Arc;

const PATCH: &str = r#"
steps:
  - id: patch
    method: shell.run
    params:
      path: repo
      check: "git apply --check ../fix.patch"
      message: "git apply ../fix.patch"
  - id: install
    method: shell.run
    params: { message: "pip install -e repo" }
"#;

#[tokio::test]
async fn test_check_passes_apply_runs() {
    let executor = MockExecutor::new();
    let result = run(PATCH, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert_eq!(
        executor.commands(),
        vec!["git apply --check ../fix.patch", "git apply ../fix.patch", "pip install -e repo"]
    );
    assert!(executor.requests()[..2]
        .iter()
        .all(|r| r.cwd == std::path::PathBuf::from("/work/repo")));
}

/// Already applied: the check fails, the step is skipped, not failed
#[tokio::test]
async fn test_check_fails_step_skipped() {
    let executor = MockExecutor::new().fail("--check", "error: patch does not apply");
    let result = run(PATCH, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert!(matches!(result.step_state("patch"), StepState::Skipped { .. }));
    assert_eq!(
        executor.commands(),
        vec!["git apply --check ../fix.patch", "pip install -e repo"]
    );
    assert!(result.report.failure.is_none());
}

const CLONE_AND_PATCH: &str = r#"
steps:
  - id: clone
    method: shell.run
    when: "{{!exists('app')}}"
    params: { message: "git clone https://example.invalid/app.git app" }
  - id: patch
    method: shell.run
    params:
      path: app
      check: "git apply --check ../fix.patch"
      message: "git apply ../fix.patch"
  - id: deps
    method: shell.run
    params: { path: app, message: "pip install -r requirements.txt" }
"#;

/// The second run finds the clone and the applied patch and does neither again
#[tokio::test]
async fn test_second_run_skips_completed_work() {
    let fs = Arc::new(InMemoryFs::default());
    let executor = MockExecutor::new();

    let first = run_in(
        CLONE_AND_PATCH,
        &executor,
        InMemoryLoader::new(),
        linux_context().with_filesystem(fs.clone()),
    )
    .await;
    assert_eq!(first.report.status, ExecutionStatus::Completed);
    let first_commands = executor.commands();
    assert_eq!(
        first_commands,
        vec![
            "git clone https://example.invalid/app.git app",
            "git apply --check ../fix.patch",
            "git apply ../fix.patch",
            "pip install -r requirements.txt",
        ]
    );

    // What the first run left behind
    fs.add("/work/app");
    let executor = executor.fail("--check", "error: patch does not apply");

    let second = run_in(
        CLONE_AND_PATCH,
        &executor,
        InMemoryLoader::new(),
        linux_context().with_filesystem(fs.clone()),
    )
    .await;
    assert_eq!(second.report.status, ExecutionStatus::Completed);
    assert!(matches!(second.step_state("clone"), StepState::Skipped { .. }));
    assert!(matches!(second.step_state("patch"), StepState::Skipped { .. }));

    let second_commands = executor.commands()[first_commands.len()..].to_vec();
    assert_eq!(
        second_commands,
        vec!["git apply --check ../fix.patch", "pip install -r requirements.txt"]
    );
    assert!(second_commands.len() < first_commands.len());
    assert_eq!(first.report.records.len(), second.report.records.len());
    assert_ne!(first.report.execution_id, second.report.execution_id);
}
