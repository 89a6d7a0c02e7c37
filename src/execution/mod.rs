//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod report;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{StepDispatcher, StepOutcome};
pub use report::{FailureRecord, RunReport, StepOutcomeKind, StepRecord, StepRef};
pub use scheduler::StepCursor;
