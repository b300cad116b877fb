use crate::error::HarvestError;
use thiserror::Error;

/// Errors raised by the step and engine state machines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Invalid state transition from {from} on '{event}'")]
    InvalidTransition { from: String, event: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;

impl From<StateMachineError> for HarvestError {
    fn from(error: StateMachineError) -> Self {
        HarvestError::InvalidState(error.to_string())
    }
}
