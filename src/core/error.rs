//! Pipeline error taxonomy

use crate::template::TemplateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification used by the fail policy and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed pipeline: bad template, unknown method, unknown jump label
    Configuration,
    /// A command (or a nested pipeline) failed
    ExternalCommand,
    /// The run was interrupted
    Aborted,
}

/// Errors raised while loading or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid template in {context}: {source}")]
    Template {
        context: String,
        #[source]
        source: TemplateError,
    },

    #[error("Command `{command}` exited with code {exit_code}")]
    ExternalCommand {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sub-pipeline '{uri}' failed at step {step}: {message}")]
    Subpipeline {
        uri: String,
        step: String,
        message: String,
        command: Option<String>,
        output: Option<String>,
    },

    #[error("Pipeline aborted")]
    Aborted,
}

impl PipelineError {
    /// Build a template error with the location it was found in
    pub fn template(context: impl Into<String>, source: TemplateError) -> Self {
        PipelineError::Template {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Configuration(_) | PipelineError::Template { .. } => {
                ErrorKind::Configuration
            }
            PipelineError::ExternalCommand { .. }
            | PipelineError::Launch { .. }
            | PipelineError::Subpipeline { .. } => ErrorKind::ExternalCommand,
            PipelineError::Aborted => ErrorKind::Aborted,
        }
    }

    /// Whether a fail-soft step may absorb this error
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::ExternalCommand
    }

    /// Captured diagnostic output, when the failure produced any
    pub fn diagnostic_output(&self) -> Option<&str> {
        match self {
            PipelineError::ExternalCommand { output, .. } => Some(output.as_str()),
            PipelineError::Subpipeline { output, .. } => output.as_deref(),
            _ => None,
        }
    }

    /// The command line involved in the failure, if any
    pub fn command(&self) -> Option<&str> {
        match self {
            PipelineError::ExternalCommand { command, .. }
            | PipelineError::Launch { command, .. } => Some(command.as_str()),
            PipelineError::Subpipeline { command, .. } => command.as_deref(),
            _ => None,
        }
    }
}
