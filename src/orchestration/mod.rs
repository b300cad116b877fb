//! # Orchestration
//!
//! Session-level coordination of harvest execution.
//!
//! ## Core Components
//!
//! - **ActionEngine**: drives a [`crate::models::HarvestSession`] through a
//!   [`crate::execution::StepExecutor`], guards against concurrent runs,
//!   retries from the first failed step and reports outcomes through
//!   callbacks, lifecycle events and loading progress.

pub mod action_engine;

pub use action_engine::{
    ActionEngine, ActionEngineConfig, EngineSnapshot, ExecutionOutcome, RejectionReason,
};
