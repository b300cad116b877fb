//! # System Constants
//!
//! Event names and fixed identifiers shared across the harvest engine.

/// Lifecycle event names published through [`crate::events::EventPublisher`]
pub mod events {
    // Session lifecycle events
    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_RETRY_STARTED: &str = "session.retry_started";
    pub const SESSION_COMPLETED: &str = "session.completed";
    pub const SESSION_FAILED: &str = "session.failed";
    pub const SESSION_CANCELLED: &str = "session.cancelled";

    // Step lifecycle events
    pub const STEP_UPDATED: &str = "step.updated";
}

/// Fixed identifiers and limits
pub mod system {
    /// Loading context id prefix for engine run progress
    pub const EXECUTION_PROGRESS_PREFIX: &str = "harvest-execution";

    /// Error contexts kept for `recent_errors()`
    pub const ERROR_HISTORY_LIMIT: usize = 50;

    /// Default lifecycle event channel capacity
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}
