//! Test: command output capture feeds later steps

use crate::helpers::*;
use provision::core::ExecutionStatus;
use serde_json::json;

/// Captured stdout parsed with a regex and a fallback
#[tokio::test]
async fn test_extract_cuda_arch_from_stdout() {
    let yaml = r#"
steps:
  - method: shell.run
    params:
      message: "python -c \"import torch; print('CUDA_ARCH:%d.%d' % torch.cuda.get_device_capability())\""
  - method: local.set
    params:
      cuda_arch: "{{input.stdout.match(/CUDA_ARCH:(\\d+\\.\\d+)/)?.[1] || '8.9'}}"
"#;
    let executor = MockExecutor::new().respond("CUDA_ARCH", "CUDA_ARCH:8.9\n", 0);
    let result = run(yaml, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Completed);
    assert_eq!(result.var("cuda_arch"), Some(&json!("8.9")));
}

#[tokio::test]
async fn test_regex_fallback_when_no_match() {
    let yaml = r#"
steps:
  - method: shell.run
    params: { message: "detect" }
  - method: local.set
    params:
      cuda_arch: "{{input.stdout.match(/CUDA_ARCH:(\\d+\\.\\d+)/)?.[1] || '8.9'}}"
"#;
    let executor = MockExecutor::new().respond("detect", "no gpu here\n", 0);
    let result = run(yaml, &executor).await;
    assert_eq!(result.var("cuda_arch"), Some(&json!("8.9")));
}

/// A value captured by one step appears verbatim in the next command
#[tokio::test]
async fn test_captured_value_flows_into_next_command() {
    let yaml = r#"
steps:
  - method: shell.run
    params: { message: "python --version" }
  - method: local.set
    params:
      py: "{{input.stdout.trim()}}"
  - method: shell.run
    params:
      message: "echo using {{py}} in {{cwd}}"
"#;
    let executor = MockExecutor::new().respond("--version", "Python 3.10.11\n", 0);
    let result = run(yaml, &executor).await;

    assert_eq!(
        executor.commands(),
        vec!["python --version", "echo using Python 3.10.11 in /work"]
    );
    assert_eq!(result.var("input").unwrap()["exitCode"], json!(0));
}

/// `input` holds the last line executed, including on failure
#[tokio::test]
async fn test_input_reflects_failing_line() {
    let yaml = r#"
steps:
  - method: shell.run
    params:
      message:
        - "pip install -U pip"
        - "pip install torch"
        - "pip install never-run"
"#;
    let executor = MockExecutor::new().fail("install torch", "ERROR: No matching distribution");
    let result = run(yaml, &executor).await;

    assert_eq!(result.report.status, ExecutionStatus::Failed);
    assert_eq!(executor.commands().len(), 2);
    let input = result.var("input").unwrap();
    assert_eq!(input["exitCode"], json!(1));
    assert_eq!(input["stderr"], json!("ERROR: No matching distribution"));

    let failure = result.report.failure.as_ref().unwrap();
    assert_eq!(failure.command.as_deref(), Some("pip install torch"));
    assert!(failure.output.as_deref().unwrap().contains("No matching distribution"));
}

/// Working directory, venv and env are resolved per step
#[tokio::test]
async fn test_run_options_are_resolved() {
    let yaml = r#"
variables:
  venv_dir: env
steps:
  - method: shell.run
    params:
      path: app
      venv: "{{venv_dir}}"
      env:
        TORCH_CUDA_ARCH_LIST: "{{gpu === 'nvidia' ? '8.6' : ''}}"
      message: "pip install -r requirements.txt"
  - method: shell.run
    params: { message: "ls" }
"#;
    let executor = MockExecutor::new();
    run(yaml, &executor).await;

    let requests = executor.requests();
    assert_eq!(requests[0].cwd, std::path::PathBuf::from("/work/app"));
    assert_eq!(requests[0].venv.as_deref(), Some("env"));
    assert_eq!(requests[0].env.get("TORCH_CUDA_ARCH_LIST").map(String::as_str), Some("8.6"));
    assert_eq!(requests[1].cwd, std::path::PathBuf::from("/work"));
    assert!(requests[1].venv.is_none());
}
