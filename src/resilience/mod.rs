//! # Resilience
//!
//! Error classification, retry with exponential backoff, graceful degradation
//! and the network-aware response cache.
//!
//! ## Architecture
//!
//! - **ErrorClassifier**: message-based severity and recoverability rules
//! - **RetryPolicy**: capped exponential backoff with optional jitter
//! - **TtlCache**: bounded insertion-ordered cache with staleness
//! - **NetworkStatusManager**: connectivity tracking and cache-backed fetches
//! - **ErrorHandlingSystem**: retry → cached data → simplified mode pipeline
//!
//! ## Usage
//!
//! ```rust,no_run
//! use harvest_engine::error::HarvestError;
//! use harvest_engine::resilience::{ErrorHandlingSystem, NetworkStatusManager, RecoveryOptions};
//!
//! # async fn example() {
//! let network = NetworkStatusManager::default();
//! let handler = ErrorHandlingSystem::default();
//! let error = HarvestError::Server { status: 503, message: "maintenance".into() };
//!
//! let recovery = handler
//!     .handle_api_error::<Vec<String>>(
//!         &error,
//!         "opportunities",
//!         "load",
//!         RecoveryOptions::none().with_network_cache(&network, "opportunities"),
//!     )
//!     .await;
//! println!("{}", recovery.context.user_message);
//! # }
//! ```

pub mod backoff;
pub mod cache;
pub mod error_classifier;
pub mod error_handler;
pub mod network_status;

pub use backoff::RetryPolicy;
pub use cache::{CacheEntry, CacheLookup, TtlCache};
pub use error_classifier::{
    classify_error_severity, is_recoverable, ErrorContext, ErrorSeverity, Resolution,
};
pub use error_handler::{ErrorHandlingSystem, Recovery, RecoveryOptions};
pub use network_status::{CachedData, FetchOptions, FetchResult, NetworkStatusManager};
