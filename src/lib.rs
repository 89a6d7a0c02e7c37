//! provision - declarative provisioning pipelines
//!
//! A pipeline is an ordered list of guarded steps that run shell commands,
//! set variables, log, jump, or invoke nested pipelines. Templates with
//! `{{ }}` placeholders are compiled when the document is loaded and
//! evaluated against the run's variable store and startup facts.

pub mod cli;
pub mod core;
pub mod execution;
pub mod host;
pub mod template;

// Re-export commonly used types
pub use crate::core::{
    ExecutionContext, ExecutionStatus, FileLoader, Pipeline, PipelineError, PipelineLoader,
    StartupFacts, Step, StepState,
};
pub use crate::execution::{ExecutionEngine, ExecutionEvent, RunReport};
pub use crate::host::{ProcessExecutor, ShellExecutor};
pub use crate::template::{Template, TemplateError};
