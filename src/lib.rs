#![allow(clippy::doc_markdown)] // Allow technical terms like DeFi, CEX in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Harvest Engine
//!
//! Execution-state machine and loading/error-recovery orchestration for
//! multi-step tax-loss harvesting flows.
//!
//! ## Overview
//!
//! A harvest session is an ordered list of execution steps, each either an
//! on-chain transaction or a manual action on a centralized exchange. The
//! engine runs the steps strictly in order through a pluggable step executor,
//! halts on the first failure, and lets the caller retry from the failed step
//! without touching the completed prefix. Around that core sit the loading
//! state registry, the error recovery pipeline (retry with backoff, cached
//! data, simplified mode) and prerequisite gating for user actions.
//!
//! ## Module Organization
//!
//! - [`models`] - Harvest sessions and execution steps
//! - [`state_machine`] - Step and engine lifecycle transitions
//! - [`execution`] - Step executor strategy and the randomized simulator
//! - [`orchestration`] - Session-level action engine
//! - [`loading`] - Named loading contexts with progress and timeouts
//! - [`resilience`] - Error classification, backoff, cache and network status
//! - [`gating`] - Action prerequisite evaluation
//! - [`events`] - Lifecycle event broadcasting
//! - [`config`] - Layered configuration management
//! - [`error`] - Structured error handling
//! - [`system_context`] - Shared service container
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harvest_engine::config::{ConfigManager, HarvestConfig};
//! use harvest_engine::models::{ExecutionStep, HarvestSession};
//! use harvest_engine::SystemContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! harvest_engine::logging::init_structured_logging();
//!
//! let config = ConfigManager::from_config(HarvestConfig::default(), "development")?;
//! let context = SystemContext::from_config(config);
//! context.start_background_services();
//!
//! let mut session = HarvestSession::new(vec![
//!     ExecutionStep::on_chain("approve", 1, "Approve USDC"),
//!     ExecutionStep::on_chain("swap", 2, "Swap USDC for ETH"),
//!     ExecutionStep::cex_manual("sell", 3, "Sell ETH", "Kraken"),
//! ]);
//!
//! let outcome = context.action_engine.execute_session(&mut session).await;
//! if !outcome.is_completed() {
//!     context.action_engine.retry_execution(&mut session).await;
//! }
//!
//! context.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Timer-driven behaviour (step delays, loading timeouts, backoff, cache TTL)
//! runs on `tokio::time`, so tests use a paused clock:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod gating;
pub mod loading;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;
pub mod system_context;
pub mod utils;

pub use config::{ConfigManager, HarvestConfig};
pub use error::{HarvestError, Result, WalletErrorKind};
pub use events::{EventPublisher, HarvestEvent};
pub use execution::{ExecutionConfig, ExecutionResult, SimulatedStepExecutor, StepExecutor};
pub use gating::{ActionConfig, ActionEvaluation, ActionGate};
pub use loading::{LoadingContext, LoadingState, LoadingStateManager, OperationType};
pub use models::{ExecutionStep, HarvestSession, StepType};
pub use orchestration::{ActionEngine, ActionEngineConfig, ExecutionOutcome};
pub use resilience::{
    ErrorContext, ErrorHandlingSystem, ErrorSeverity, NetworkStatusManager, RecoveryOptions,
};
pub use state_machine::{EngineState, SessionStatus, StepStatus};
pub use system_context::SystemContext;
