//! Test: guards gate steps on startup facts and variables

use crate::helpers::*;
use provision::core::{ExecutionStatus, GpuVendor, Platform, StepState};
use provision::host::Filesystem;
use std::sync::Arc;

const PLATFORM_BRANCHES: &str = r#"
name: "platform branches"
steps:
  - id: windows
    method: local.set
    when: "{{platform === 'win32'}}"
    params:
      shell_kind: cmd
  - id: unix
    method: shell.run
    when: "{{platform !== 'win32'}}"
    params:
      message: "uname -a"
  - id: always
    method: log
    params:
      text: "done on {{platform}}/{{gpu}}/{{arch}}"
"#;

/// A false platform guard skips the step and leaves the store untouched
#[tokio::test]
async fn test_platform_guard_skips_on_linux() {
    let executor = MockExecutor::new();
    let result = run(PLATFORM_BRANCHES, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert!(matches!(result.step_state("windows"), StepState::Skipped { .. }));
    assert!(result.var("shell_kind").is_none());
    assert!(matches!(result.step_state("unix"), StepState::Succeeded { .. }));
    assert_eq!(executor.commands(), vec!["uname -a"]);
    assert_eq!(result.logs(), vec!["done on linux/nvidia/x64"]);
}

#[tokio::test]
async fn test_platform_guard_runs_on_windows() {
    let executor = MockExecutor::new();
    let result = run_in(
        PLATFORM_BRANCHES,
        &executor,
        InMemoryLoader::new(),
        context(Platform::Win32, GpuVendor::None),
    )
    .await;

    assert_eq!(result.var("shell_kind"), Some(&serde_json::json!("cmd")));
    assert!(matches!(result.step_state("unix"), StepState::Skipped { .. }));
    assert!(executor.commands().is_empty());
}

/// Reading an undefined variable is falsy, never an error
#[tokio::test]
async fn test_undefined_variable_guard_is_false() {
    let yaml = r#"
steps:
  - id: needs_flag
    method: log
    when: "{{local.never_set}}"
    params: { text: "unreachable" }
  - id: negated
    method: log
    when: "!never_set"
    params: { text: "flag missing: [{{never_set}}]" }
"#;
    let result = run(yaml, &MockExecutor::new()).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert!(matches!(result.step_state("needs_flag"), StepState::Skipped { .. }));
    assert_eq!(result.logs(), vec!["flag missing: []"]);
}

#[tokio::test]
async fn test_literal_boolean_guards() {
    let yaml = r#"
steps:
  - id: off
    method: log
    when: false
    params: { text: "off" }
  - id: on
    method: log
    when: true
    params: { text: "on" }
"#;
    let result = run(yaml, &MockExecutor::new()).await;
    assert_eq!(result.logs(), vec!["on"]);
}

/// `exists()` resolves against the current directory
#[tokio::test]
async fn test_exists_guard_uses_filesystem() {
    let yaml = r#"
steps:
  - id: create_venv
    method: shell.run
    when: "{{!exists('venv')}}"
    params: { message: "python -m venv venv" }
  - id: clone_ext
    method: shell.run
    when: "{{gpu === 'nvidia' && !exists('extensions/nvdiffrast')}}"
    params: { message: "git clone https://github.com/NVlabs/nvdiffrast extensions/nvdiffrast" }
"#;
    let fs: Arc<dyn Filesystem> = Arc::new(InMemoryFs::with(&["/work/venv"]));
    let executor = MockExecutor::new();
    let result = run_in(
        yaml,
        &executor,
        InMemoryLoader::new(),
        linux_context().with_filesystem(fs),
    )
    .await;

    assert!(matches!(result.step_state("create_venv"), StepState::Skipped { .. }));
    assert_eq!(executor.commands().len(), 1);
    assert!(executor.commands()[0].starts_with("git clone"));
}

/// Guard skip reasons land in the report
#[tokio::test]
async fn test_skip_reason_is_reported() {
    let result = run(PLATFORM_BRANCHES, &MockExecutor::new()).await;
    let record = result.report.record_for(0).unwrap();
    assert!(record.detail.as_deref().unwrap().contains("platform === 'win32'"));
}
