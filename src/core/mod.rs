//! Core domain models for provisioning pipelines
//!
//! This module defines pipelines, steps, their configuration, the execution
//! context steps read and write, and the error taxonomy.

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod facts;
pub mod loader;
pub mod pipeline;
pub mod state;
pub mod step;

pub use condition::Guard;
pub use context::*;
pub use error::{ErrorKind, PipelineError};
pub use facts::{GpuVendor, Platform, StartupFacts};
pub use loader::{FileLoader, PipelineLoader};
pub use pipeline::*;
pub use state::*;
pub use step::*;
