use crate::constants::events;
use crate::models::ExecutionStep;
use crate::state_machine::{SessionStatus, StepStatus};
use serde::{Deserialize, Serialize};

/// Lifecycle events emitted while a harvest session executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HarvestEvent {
    SessionStarted {
        session_id: String,
        total_steps: usize,
    },
    RetryStarted {
        session_id: String,
        from_step_index: usize,
    },
    StepUpdated {
        session_id: String,
        step_index: usize,
        step_id: String,
        status: StepStatus,
    },
    SessionCompleted {
        session_id: String,
    },
    SessionFailed {
        session_id: String,
        status: SessionStatus,
        reason: String,
    },
    ExecutionCancelled {
        session_id: String,
    },
}

impl HarvestEvent {
    pub fn step_updated(session_id: &str, step_index: usize, step: &ExecutionStep) -> Self {
        Self::StepUpdated {
            session_id: session_id.to_string(),
            step_index,
            step_id: step.id.clone(),
            status: step.status,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => events::SESSION_STARTED,
            Self::RetryStarted { .. } => events::SESSION_RETRY_STARTED,
            Self::StepUpdated { .. } => events::STEP_UPDATED,
            Self::SessionCompleted { .. } => events::SESSION_COMPLETED,
            Self::SessionFailed { .. } => events::SESSION_FAILED,
            Self::ExecutionCancelled { .. } => events::SESSION_CANCELLED,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::RetryStarted { session_id, .. }
            | Self::StepUpdated { session_id, .. }
            | Self::SessionCompleted { session_id }
            | Self::SessionFailed { session_id, .. }
            | Self::ExecutionCancelled { session_id } => session_id,
        }
    }
}
