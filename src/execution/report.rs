//! Run reports

use crate::core::{ErrorKind, ExecutionStatus, PipelineError, Step, StepState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Identity of a step within a (possibly nested) run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRef {
    /// Name of the pipeline the step belongs to
    pub pipeline: String,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Label, or position and method
    pub name: String,
    pub method: &'static str,
    /// Sub-pipeline nesting depth, 0 at top level
    pub depth: usize,
}

impl StepRef {
    pub fn new(pipeline: &str, step: &Step, depth: usize) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            index: step.index,
            label: step.label.clone(),
            name: step.name(),
            method: step.kind().method(),
            depth,
        }
    }
}

/// Terminal outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcomeKind {
    Succeeded,
    Skipped,
    FailedSoft,
    Failed,
}

/// One line of the report per step that reached a terminal state
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    #[serde(flatten)]
    pub step: StepRef,
    pub outcome: StepOutcomeKind,
    /// Skip reason or error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    /// Build a record from a terminal step state
    pub fn from_state(step: StepRef, state: &StepState) -> Option<Self> {
        let (outcome, detail) = match state {
            StepState::Succeeded { .. } => (StepOutcomeKind::Succeeded, None),
            StepState::Skipped { reason } => (StepOutcomeKind::Skipped, Some(reason.clone())),
            StepState::FailedSoft { error, .. } => {
                (StepOutcomeKind::FailedSoft, Some(error.clone()))
            }
            StepState::Failed { error, .. } => (StepOutcomeKind::Failed, Some(error.clone())),
            StepState::Pending | StepState::Running { .. } => return None,
        };
        Some(Self {
            step,
            outcome,
            detail,
            finished_at: Utc::now(),
        })
    }
}

/// Details of the failure that stopped a run
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub step: StepRef,
    pub kind: ErrorKind,
    pub message: String,
    /// Resolved command line, for command failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Tail of the captured output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl FailureRecord {
    pub fn new(step: StepRef, error: &PipelineError) -> Self {
        Self {
            step,
            kind: error.kind(),
            message: error.to_string(),
            command: error.command().map(str::to_string),
            output: error.diagnostic_output().map(str::to_string),
        }
    }
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub execution_id: Uuid,
    pub pipeline: String,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    fn with_outcome(&self, outcome: StepOutcomeKind) -> Vec<&StepRecord> {
        self.records.iter().filter(|r| r.outcome == outcome).collect()
    }

    pub fn succeeded_steps(&self) -> Vec<&StepRecord> {
        self.with_outcome(StepOutcomeKind::Succeeded)
    }

    pub fn skipped_steps(&self) -> Vec<&StepRecord> {
        self.with_outcome(StepOutcomeKind::Skipped)
    }

    pub fn failed_soft_steps(&self) -> Vec<&StepRecord> {
        self.with_outcome(StepOutcomeKind::FailedSoft)
    }

    /// Record for the top-level step at `index`, the last one if it ran twice
    pub fn record_for(&self, index: usize) -> Option<&StepRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.step.depth == 0 && r.step.index == index)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
