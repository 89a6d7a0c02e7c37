//! Main execution engine - orchestrates a pipeline run

use crate::{
    core::{
        ExecutionContext, ExecutionStatus, FailPolicy, Pipeline, PipelineError, PipelineLoader,
        StepState,
    },
    execution::{
        executor::{StepDispatcher, StepOutcome},
        report::{FailureRecord, RunReport, StepRecord, StepRef},
        scheduler::StepCursor,
    },
    host::ProcessExecutor,
};
use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline: String,
        depth: usize,
        total_steps: usize,
    },
    StepStarted {
        step: StepRef,
    },
    StepSkipped {
        step: StepRef,
        reason: String,
    },
    StepSucceeded {
        step: StepRef,
    },
    StepFailedSoft {
        step: StepRef,
        error: String,
    },
    StepFailed {
        step: StepRef,
        error: String,
    },
    CommandStarted {
        step: StepRef,
        command: String,
    },
    CommandFinished {
        step: StepRef,
        command: String,
        exit_code: i32,
    },
    Log {
        step: StepRef,
        message: String,
    },
    Jumped {
        step: StepRef,
        target: String,
    },
    PipelineFinished {
        execution_id: Uuid,
        pipeline: String,
        depth: usize,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// A fatal failure and the step it happened in
struct Failure {
    step: StepRef,
    error: PipelineError,
}

type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Failure>> + 'a>>;

/// Main pipeline execution engine
///
/// Steps run one at a time, in document order unless a jump moves the
/// cursor. Each step is awaited to completion before the next guard is
/// evaluated.
pub struct ExecutionEngine<P> {
    dispatcher: StepDispatcher<P>,
    event_handlers: Vec<EventHandler>,
    abort: Arc<AtomicBool>,
}

impl<P: ProcessExecutor> ExecutionEngine<P> {
    pub fn new(process: P, loader: Arc<dyn PipelineLoader>) -> Self {
        Self {
            dispatcher: StepDispatcher::new(process, loader),
            event_handlers: Vec::new(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Flag checked before every step; setting it ends the run as aborted
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    fn emit(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    pub async fn execute(&self, pipeline: &mut Pipeline, ctx: &mut ExecutionContext) -> RunReport {
        self.execute_at(pipeline, ctx, 0).await
    }

    /// Execute starting at the step labelled `label`
    pub async fn execute_from(
        &self,
        pipeline: &mut Pipeline,
        ctx: &mut ExecutionContext,
        label: &str,
    ) -> Result<RunReport, PipelineError> {
        let index = pipeline.label_index(label).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "no step labelled '{}' in pipeline {}",
                label, pipeline.name
            ))
        })?;
        info!("Resuming pipeline {} at step '{}'", pipeline.name, label);
        Ok(self.execute_at(pipeline, ctx, index).await)
    }

    async fn execute_at(
        &self,
        pipeline: &mut Pipeline,
        ctx: &mut ExecutionContext,
        start: usize,
    ) -> RunReport {
        // Command-line overrides already in the store win over document defaults
        for (name, value) in &pipeline.variables {
            if !ctx.variables.contains(name) {
                ctx.variables.set(name.clone(), value.clone());
            }
        }

        let mut records = Vec::new();
        let result = self.run_pipeline(pipeline, ctx, start, &mut records).await;

        RunReport {
            execution_id: pipeline.state.execution_id,
            pipeline: pipeline.name.clone(),
            status: pipeline.state.status,
            started_at: pipeline.state.started_at,
            completed_at: pipeline.state.completed_at,
            records,
            failure: result
                .err()
                .map(|failure| FailureRecord::new(failure.step, &failure.error)),
        }
    }

    /// Run one pipeline to a terminal state
    ///
    /// Boxed because sub-pipelines recurse through it.
    fn run_pipeline<'a>(
        &'a self,
        pipeline: &'a mut Pipeline,
        ctx: &'a mut ExecutionContext,
        start: usize,
        records: &'a mut Vec<StepRecord>,
    ) -> RunFuture<'a> {
        Box::pin(async move {
            let execution_id = pipeline.state.execution_id;
            let depth = ctx.depth();
            let total_steps = pipeline.steps.len();

            info!(
                "Starting pipeline execution: {} ({}) depth={}",
                pipeline.name, execution_id, depth
            );
            pipeline.state.start(total_steps);
            self.emit(ExecutionEvent::PipelineStarted {
                execution_id,
                pipeline: pipeline.name.clone(),
                depth,
                total_steps,
            });

            let mut cursor = StepCursor::starting_at(total_steps, start);
            while let Some(index) = cursor.advance() {
                let step = pipeline.steps[index].clone();
                let step_ref = StepRef::new(&pipeline.name, &step, depth);

                if self.abort.load(Ordering::SeqCst) {
                    warn!("Abort requested before step {}", step_ref.name);
                    self.finish(pipeline, depth, ExecutionStatus::Aborted);
                    return Err(Failure {
                        step: step_ref,
                        error: PipelineError::Aborted,
                    });
                }

                if let Some(guard) = &step.guard {
                    if !guard.evaluate(&*ctx) {
                        let reason = format!("guard `{}` is false", guard.describe());
                        debug!("Skipping step {}: {}", step_ref.name, reason);
                        self.settle(
                            pipeline,
                            index,
                            StepState::Skipped {
                                reason: reason.clone(),
                            },
                            &step_ref,
                            records,
                        );
                        self.emit(ExecutionEvent::StepSkipped {
                            step: step_ref,
                            reason,
                        });
                        continue;
                    }
                }

                let started_at = Utc::now();
                pipeline.steps[index].state = StepState::Running { started_at };
                self.emit(ExecutionEvent::StepStarted {
                    step: step_ref.clone(),
                });

                let emit = |event: ExecutionEvent| self.emit(event);
                let outcome = match self
                    .dispatcher
                    .dispatch(&step, pipeline, ctx, &step_ref, &emit)
                    .await
                {
                    Ok(StepOutcome::Invoke {
                        pipeline: nested,
                        args,
                        uri,
                    }) => self
                        .invoke(*nested, args, uri, ctx, records)
                        .await
                        .map(|_| StepOutcome::Completed),
                    other => other,
                };

                match outcome {
                    Ok(StepOutcome::Completed) | Ok(StepOutcome::Invoke { .. }) => {
                        self.settle(
                            pipeline,
                            index,
                            StepState::Succeeded {
                                started_at,
                                completed_at: Utc::now(),
                            },
                            &step_ref,
                            records,
                        );
                        self.emit(ExecutionEvent::StepSucceeded { step: step_ref });
                    }
                    Ok(StepOutcome::Skipped { reason }) => {
                        info!("Skipping step {}: {}", step_ref.name, reason);
                        self.settle(
                            pipeline,
                            index,
                            StepState::Skipped {
                                reason: reason.clone(),
                            },
                            &step_ref,
                            records,
                        );
                        self.emit(ExecutionEvent::StepSkipped {
                            step: step_ref,
                            reason,
                        });
                    }
                    Ok(StepOutcome::Jump { index: target, label }) => {
                        info!("Step {} jumps to '{}'", step_ref.name, label);
                        self.settle(
                            pipeline,
                            index,
                            StepState::Succeeded {
                                started_at,
                                completed_at: Utc::now(),
                            },
                            &step_ref,
                            records,
                        );
                        self.emit(ExecutionEvent::StepSucceeded {
                            step: step_ref.clone(),
                        });
                        self.emit(ExecutionEvent::Jumped {
                            step: step_ref,
                            target: label,
                        });
                        cursor.jump_to(target);
                    }
                    Err(PipelineError::Aborted) => {
                        warn!("Pipeline {} aborted in step {}", pipeline.name, step_ref.name);
                        self.finish(pipeline, depth, ExecutionStatus::Aborted);
                        return Err(Failure {
                            step: step_ref,
                            error: PipelineError::Aborted,
                        });
                    }
                    Err(err) if step.fail_policy == FailPolicy::Soft && err.is_recoverable() => {
                        warn!("Step {} failed (continuing): {}", step_ref.name, err);
                        let message = err.to_string();
                        self.settle(
                            pipeline,
                            index,
                            StepState::FailedSoft {
                                error: message.clone(),
                                failed_at: Utc::now(),
                            },
                            &step_ref,
                            records,
                        );
                        self.emit(ExecutionEvent::StepFailedSoft {
                            step: step_ref,
                            error: message,
                        });
                    }
                    Err(err) => {
                        error!("Step {} failed: {}", step_ref.name, err);
                        let message = err.to_string();
                        self.settle(
                            pipeline,
                            index,
                            StepState::Failed {
                                error: message.clone(),
                                failed_at: Utc::now(),
                            },
                            &step_ref,
                            records,
                        );
                        self.emit(ExecutionEvent::StepFailed {
                            step: step_ref.clone(),
                            error: message,
                        });
                        self.finish(pipeline, depth, ExecutionStatus::Failed);
                        return Err(Failure {
                            step: step_ref,
                            error: err,
                        });
                    }
                }
            }

            self.finish(pipeline, depth, ExecutionStatus::Completed);
            Ok(())
        })
    }

    /// Run a nested pipeline sharing the caller's context
    ///
    /// A nested failure becomes a failure of the invoking step; configuration
    /// errors and aborts keep their kind.
    async fn invoke(
        &self,
        mut nested: Pipeline,
        args: Value,
        uri: String,
        ctx: &mut ExecutionContext,
        records: &mut Vec<StepRecord>,
    ) -> Result<(), PipelineError> {
        ctx.enter_subpipeline(args)?;
        let result = self.run_pipeline(&mut nested, ctx, 0, records).await;
        ctx.leave_subpipeline();

        result.map_err(|failure| match failure.error {
            err @ (PipelineError::Configuration(_)
            | PipelineError::Template { .. }
            | PipelineError::Aborted) => err,
            err => PipelineError::Subpipeline {
                uri,
                step: failure.step.name,
                message: err.to_string(),
                command: err.command().map(str::to_string),
                output: err.diagnostic_output().map(str::to_string),
            },
        })
    }

    /// Store a terminal step state and record it
    fn settle(
        &self,
        pipeline: &mut Pipeline,
        index: usize,
        state: StepState,
        step_ref: &StepRef,
        records: &mut Vec<StepRecord>,
    ) {
        debug!("Step {} -> {}", step_ref.name, state.label());
        pipeline.state.record(&state);
        if let Some(record) = StepRecord::from_state(step_ref.clone(), &state) {
            records.push(record);
        }
        pipeline.steps[index].state = state;
    }

    fn finish(&self, pipeline: &mut Pipeline, depth: usize, status: ExecutionStatus) {
        match status {
            ExecutionStatus::Completed => pipeline.state.complete(),
            ExecutionStatus::Failed => pipeline.state.fail(),
            _ => pipeline.state.abort(),
        }
        info!(
            "Pipeline execution finished: {} - {:?} ({:.0}% of steps settled)",
            pipeline.name,
            status,
            pipeline.state.progress() * 100.0
        );
        self.emit(ExecutionEvent::PipelineFinished {
            execution_id: pipeline.state.execution_id,
            pipeline: pipeline.name.clone(),
            depth,
            status,
        });
    }
}
