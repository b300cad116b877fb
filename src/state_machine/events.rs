use serde::{Deserialize, Serialize};

/// Events that drive an execution step's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StepEvent {
    /// Step becomes the current one
    Start,
    /// Step finished successfully
    Complete,
    /// Step failed with error message
    Fail(String),
    /// Step goes back to pending (retry or cancellation)
    Reset,
}

impl StepEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Reset => "reset",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Events that drive the orchestration engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    /// Begin executing a session from its first step
    Start,
    /// Resume a failed session from its first failed step
    Retry,
    /// All steps completed
    Complete,
    /// Execution halted with a reason
    Fail(String),
    /// Execution stopped by the caller
    Cancel,
}

impl EngineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Retry => "retry",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }
}
