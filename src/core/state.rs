//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Pipeline has not started
    NotStarted,
    /// Pipeline is currently running
    Running,
    /// Every step succeeded, was skipped, or failed softly
    Completed,
    /// A fail-stop step failed
    Failed,
    /// The run was interrupted between steps
    Aborted,
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepState {
    /// Not reached yet
    Pending,
    /// Currently running
    Running { started_at: DateTime<Utc> },
    /// Completed successfully
    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Guard was false, or the precondition check did not pass
    Skipped { reason: String },
    /// Failed, but the step is fail-soft
    FailedSoft {
        error: String,
        failed_at: DateTime<Utc>,
    },
    /// Failed and stopped the pipeline
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Running { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running { .. } => "running",
            StepState::Succeeded { .. } => "succeeded",
            StepState::Skipped { .. } => "skipped",
            StepState::FailedSoft { .. } => "failed_soft",
            StepState::Failed { .. } => "failed",
        }
    }
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed, failed or was aborted
    pub completed_at: Option<DateTime<Utc>>,

    pub total_steps: usize,

    /// Steps that reached a terminal state
    pub finished_steps: usize,

    pub skipped_steps: usize,

    /// Fail-soft and fail-stop failures
    pub failed_steps: usize,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::NotStarted,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            finished_steps: 0,
            skipped_steps: 0,
            failed_steps: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    pub fn complete(&mut self) {
        self.finish(ExecutionStatus::Completed);
    }

    pub fn fail(&mut self) {
        self.finish(ExecutionStatus::Failed);
    }

    pub fn abort(&mut self) {
        self.finish(ExecutionStatus::Aborted);
    }

    fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Count a step that reached a terminal state
    pub fn record(&mut self, state: &StepState) {
        self.finished_steps += 1;
        match state {
            StepState::Skipped { .. } => self.skipped_steps += 1,
            StepState::FailedSoft { .. } | StepState::Failed { .. } => self.failed_steps += 1,
            _ => {}
        }
    }

    /// Calculate progress percentage (0.0 to 1.0)
    ///
    /// Jumps can revisit steps, so the value is clamped.
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.finished_steps as f64 / self.total_steps as f64).min(1.0)
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
