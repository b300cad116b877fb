//! Error types for the harvest engine.
//!
//! Display strings are part of the contract: the text-based classifier in
//! [`crate::resilience::error_classifier`] inspects them, so each variant reads
//! the way its category is matched (network/timeout, unauthorized, server,
//! rate limit, invalid input).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Wallet-side failures surfaced while signing or connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletErrorKind {
    Rejected,
    NotInstalled,
    WrongNetwork,
    Cancelled,
}

impl fmt::Display for WalletErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "request rejected by user"),
            Self::NotInstalled => write!(f, "no wallet extension installed"),
            Self::WrongNetwork => write!(f, "connected to the wrong chain"),
            Self::Cancelled => write!(f, "request cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HarvestError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Wallet error: {0}")]
    Wallet(WalletErrorKind),
    #[error("Step {step_number} ({step_id}) failed: {reason}")]
    StepExecutionFailure {
        step_id: String,
        step_number: u32,
        reason: String,
    },
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("No cached data for key '{0}'")]
    CacheMiss(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl HarvestError {
    /// Whether this error came from infrastructure (as opposed to a step or the user)
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited(_) | Self::Server { .. } | Self::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(error: serde_json::Error) -> Self {
        HarvestError::Serialization(error.to_string())
    }
}

impl From<config::ConfigError> for HarvestError {
    fn from(error: config::ConfigError) -> Self {
        HarvestError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings_carry_category_keywords() {
        let server = HarvestError::Server {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert_eq!(server.to_string(), "Server error 502: bad gateway");

        let timeout = HarvestError::Timeout {
            operation: "price-feed".to_string(),
            timeout_ms: 8000,
        };
        assert!(timeout.to_string().contains("timed out"));

        let wallet = HarvestError::Wallet(WalletErrorKind::Rejected);
        assert_eq!(wallet.to_string(), "Wallet error: request rejected by user");
    }

    #[test]
    fn test_infrastructure_split() {
        assert!(HarvestError::Network("offline".into()).is_infrastructure());
        assert!(!HarvestError::Validation("amount".into()).is_infrastructure());
        assert!(!HarvestError::Wallet(WalletErrorKind::Cancelled).is_infrastructure());
    }
}
