//! # Step Execution
//!
//! The executor abstraction driven by the orchestration layer, and the
//! randomized simulator used in place of a real transaction backend.

pub mod simulated_executor;
pub mod step_executor;

pub use simulated_executor::SimulatedStepExecutor;
pub use step_executor::{ExecutionConfig, ExecutionResult, StepExecutor, StepUpdateCallback};
