//! Step dispatcher - runs the concrete operation behind each step kind

use crate::{
    core::{
        ExecutionContext, Pipeline, PipelineError, PipelineLoader, RunCommandParams, Step,
        StepAction, INPUT_KEY,
    },
    execution::{engine::ExecutionEvent, report::StepRef},
    host::{CommandOutput, CommandRequest, ProcessError, ProcessExecutor},
    template::TemplateValue,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Lines of output kept in a command failure
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Result of dispatching a step
#[derive(Debug)]
pub enum StepOutcome {
    /// Step did its work
    Completed,
    /// The run-command precondition did not pass
    Skipped { reason: String },
    /// Transfer control to the step at `index`
    Jump { index: usize, label: String },
    /// Run a nested pipeline with `args`; the engine owns the recursion
    Invoke {
        pipeline: Box<Pipeline>,
        args: Value,
        uri: String,
    },
}

/// Executes a single step against its collaborators
pub struct StepDispatcher<P> {
    process: P,
    loader: Arc<dyn PipelineLoader>,
}

impl<P: ProcessExecutor> StepDispatcher<P> {
    pub fn new(process: P, loader: Arc<dyn PipelineLoader>) -> Self {
        Self { process, loader }
    }

    /// Resolve a step's parameters and run it
    pub async fn dispatch(
        &self,
        step: &Step,
        pipeline: &Pipeline,
        ctx: &mut ExecutionContext,
        step_ref: &StepRef,
        emit: &dyn Fn(ExecutionEvent),
    ) -> Result<StepOutcome, PipelineError> {
        debug!("Dispatching step {} ({})", step_ref.name, step_ref.method);

        match &step.action {
            StepAction::RunCommand(params) => self.run_command(params, ctx, step_ref, emit).await,
            StepAction::SetVariable(entries) => {
                set_variables(entries, ctx);
                Ok(StepOutcome::Completed)
            }
            StepAction::InvokeSubpipeline { uri, params } => {
                let uri = uri.render(ctx);
                let args = params.resolve(ctx);
                let nested = self.loader.load(&uri, pipeline.source_dir())?;
                info!("Starting sub-pipeline {} ({} steps)", uri, nested.steps.len());
                Ok(StepOutcome::Invoke {
                    pipeline: Box::new(nested),
                    args,
                    uri,
                })
            }
            StepAction::Log { text } => {
                let message = text.render(ctx);
                info!("[{}] {}", pipeline.name, message);
                emit(ExecutionEvent::Log {
                    step: step_ref.clone(),
                    message,
                });
                Ok(StepOutcome::Completed)
            }
            StepAction::Jump { target } => {
                let label = target.render(ctx);
                let index = pipeline.label_index(&label).ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "step {} jumps to unknown label '{}'",
                        step_ref.name, label
                    ))
                })?;
                Ok(StepOutcome::Jump { index, label })
            }
        }
    }

    async fn run_command(
        &self,
        params: &RunCommandParams,
        ctx: &mut ExecutionContext,
        step_ref: &StepRef,
        emit: &dyn Fn(ExecutionEvent),
    ) -> Result<StepOutcome, PipelineError> {
        let scope: &ExecutionContext = ctx;
        let path = params
            .path
            .as_ref()
            .map(|p| p.render(scope))
            .filter(|p| !p.is_empty());
        let pushed = path.is_some();
        if let Some(path) = path {
            ctx.push_dir(path);
        }

        let result = self.run_lines(params, ctx, step_ref, emit).await;

        if pushed {
            ctx.pop_dir();
        }
        result
    }

    /// Everything is resolved before the first command runs
    async fn run_lines(
        &self,
        params: &RunCommandParams,
        ctx: &mut ExecutionContext,
        step_ref: &StepRef,
        emit: &dyn Fn(ExecutionEvent),
    ) -> Result<StepOutcome, PipelineError> {
        let scope: &ExecutionContext = ctx;
        let base = CommandRequest {
            command_line: String::new(),
            cwd: scope.current_dir().to_path_buf(),
            env: params
                .env
                .iter()
                .map(|(key, value)| (key.clone(), value.render(scope)))
                .collect::<BTreeMap<_, _>>(),
            venv: params
                .venv
                .as_ref()
                .map(|v| v.render(scope))
                .filter(|v| !v.is_empty()),
        };
        let check = params.check.as_ref().map(|c| c.render(scope));
        let lines: Vec<String> = params.messages.iter().map(|m| m.render(scope)).collect();

        if let Some(check) = check {
            let output = self.run_one(&base, &check, step_ref, emit).await?;
            if !output.success() {
                return Ok(StepOutcome::Skipped {
                    reason: format!(
                        "precondition `{}` not met (exit code {})",
                        check, output.exit_code
                    ),
                });
            }
        }

        let mut last: Option<(String, CommandOutput)> = None;
        for line in lines {
            let output = self.run_one(&base, &line, step_ref, emit).await?;
            let failed = !output.success();
            last = Some((line, output));
            if failed {
                break;
            }
        }

        if let Some((line, output)) = last {
            ctx.variables.set(
                INPUT_KEY,
                json!({
                    "stdout": output.stdout,
                    "stderr": output.stderr,
                    "exitCode": output.exit_code,
                }),
            );
            if !output.success() {
                return Err(PipelineError::ExternalCommand {
                    command: line,
                    exit_code: output.exit_code,
                    output: output.tail(DIAGNOSTIC_TAIL_LINES),
                });
            }
        }

        Ok(StepOutcome::Completed)
    }

    async fn run_one(
        &self,
        base: &CommandRequest,
        line: &str,
        step_ref: &StepRef,
        emit: &dyn Fn(ExecutionEvent),
    ) -> Result<CommandOutput, PipelineError> {
        let request = CommandRequest {
            command_line: line.to_string(),
            ..base.clone()
        };

        emit(ExecutionEvent::CommandStarted {
            step: step_ref.clone(),
            command: line.to_string(),
        });
        let output = self.process.run(&request).await.map_err(|e| match e {
            ProcessError::Spawn { command, source } | ProcessError::Io { command, source } => {
                PipelineError::Launch { command, source }
            }
        })?;
        emit(ExecutionEvent::CommandFinished {
            step: step_ref.clone(),
            command: line.to_string(),
            exit_code: output.exit_code,
        });

        Ok(output)
    }
}

/// Resolve every entry, then write the batch
///
/// Entries never see each other's new values.
fn set_variables(entries: &[(String, TemplateValue)], ctx: &mut ExecutionContext) {
    let scope: &ExecutionContext = ctx;
    let batch: Vec<(String, Value)> = entries
        .iter()
        .map(|(key, value)| (key.clone(), value.resolve(scope)))
        .collect();
    debug!("Setting {} variable(s)", batch.len());
    ctx.variables.set_all(batch);
}
