//! Loading state coordination
//!
//! Named loading contexts with default messages per operation type, progress
//! tracking, timeout flags and "global loading" detection.

pub mod manager;
pub mod types;

pub use manager::{LoadingSnapshot, LoadingStateManager};
pub use types::{sanitize_progress, LoadingContext, LoadingState, OperationType};
