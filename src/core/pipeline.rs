//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    error::PipelineError,
    state::{PipelineState, StepState},
    step::{Step, StepAction},
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A loaded, compiled pipeline
///
/// Steps are immutable once loaded; only their runtime [`StepState`] and the
/// pipeline's [`PipelineState`] change during a run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,

    pub description: Option<String>,

    /// Initial variable store contents
    pub variables: HashMap<String, Value>,

    /// Steps in document order
    pub steps: Vec<Step>,

    /// Execution state
    pub state: PipelineState,

    /// Directory the document was loaded from; sub-pipeline URIs resolve
    /// relative to it
    pub source_dir: Option<PathBuf>,

    /// Label → step index
    labels: HashMap<String, usize>,
}

impl Pipeline {
    /// Create a pipeline from configuration, compiling every template
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step_config)| Step::from_config(index, step_config))
            .collect::<Result<Vec<_>, _>>()?;

        let mut labels = HashMap::new();
        for step in &steps {
            if let Some(label) = &step.label {
                if labels.insert(label.clone(), step.index).is_some() {
                    return Err(PipelineError::Configuration(format!(
                        "duplicate step label '{}'",
                        label
                    )));
                }
            }
        }

        let pipeline = Pipeline {
            name: config.name.clone(),
            description: config.description.clone(),
            variables: config.variables_as_json()?,
            steps,
            state: PipelineState::new(),
            source_dir: None,
            labels,
        };
        pipeline.check_jump_targets()?;

        Ok(pipeline)
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    /// Index of the step carrying `label`
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    /// Reset runtime state so the pipeline can run again
    pub fn reset(&mut self) {
        self.state = PipelineState::new();
        for step in &mut self.steps {
            step.state = StepState::Pending;
        }
    }

    /// Check every jump target that is known without running anything
    ///
    /// A literal target, or an expression that can only produce literal
    /// strings (`{{ ok ? 'done' : 'retry' }}`), must name an existing label.
    /// Targets that read variables are checked when the jump runs.
    fn check_jump_targets(&self) -> Result<(), PipelineError> {
        for step in &self.steps {
            let StepAction::Jump { target } = &step.action else {
                continue;
            };

            let candidates = if target.is_literal() {
                Some(vec![target.source().to_string()])
            } else {
                let exprs: Vec<_> = target.expressions().collect();
                match exprs.as_slice() {
                    [expr] if target.source().trim().starts_with("{{")
                        && target.source().trim().ends_with("}}") =>
                    {
                        expr.static_strings()
                    }
                    _ => None,
                }
            };

            for candidate in candidates.into_iter().flatten() {
                if self.label_index(&candidate).is_none() {
                    return Err(PipelineError::Configuration(format!(
                        "step {} jumps to unknown label '{}'",
                        step.name(),
                        candidate
                    )));
                }
            }
        }
        Ok(())
    }
}
