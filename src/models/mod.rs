pub mod execution_step;
pub mod harvest_session;

// Re-export core models for easy access
pub use execution_step::{ExecutionStep, StepType};
pub use harvest_session::HarvestSession;
