//! # Error Classification
//!
//! Message-text classification of API and infrastructure errors into a
//! severity and a recoverability flag, plus the [`ErrorContext`] record the
//! error handler builds from them.
//!
//! Classification only looks at the error text, so it works the same for a
//! [`HarvestError`] and for an opaque message from an external collaborator.

use crate::error::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

const CRITICAL_PATTERNS: &[&str] = &["critical", "fatal", "panicked"];
const AUTH_PATTERNS: &[&str] = &["unauthorized", "forbidden", "401", "403"];
const SERVER_PATTERNS: &[&str] = &[
    "server error",
    "internal error",
    "bad gateway",
    "service unavailable",
];
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "too many requests", "429"];
const NETWORK_PATTERNS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "offline",
    "unreachable",
    "connection",
    "failed to fetch",
];
const UNRECOVERABLE_PATTERNS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "not found",
    "404",
    "invalid",
    "malformed",
];

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| haystack.contains(pattern))
}

/// True when the message carries a standalone 5xx status code
fn has_server_status(message: &str) -> bool {
    message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token.len() == 3 && token.starts_with('5') && token.chars().all(|c| c.is_ascii_digit()))
}

pub fn classify_error_severity(message: &str) -> ErrorSeverity {
    let message = message.to_lowercase();

    // First match wins; transport errors mentioning a 5xx stay medium
    if contains_any(&message, CRITICAL_PATTERNS) {
        ErrorSeverity::Critical
    } else if contains_any(&message, AUTH_PATTERNS) {
        ErrorSeverity::High
    } else if contains_any(&message, NETWORK_PATTERNS) {
        ErrorSeverity::Medium
    } else if contains_any(&message, SERVER_PATTERNS) || has_server_status(&message) {
        ErrorSeverity::High
    } else if contains_any(&message, RATE_LIMIT_PATTERNS) {
        ErrorSeverity::Medium
    } else {
        ErrorSeverity::Low
    }
}

pub fn is_recoverable(message: &str) -> bool {
    !contains_any(&message.to_lowercase(), UNRECOVERABLE_PATTERNS)
}

impl HarvestError {
    pub fn severity(&self) -> ErrorSeverity {
        classify_error_severity(&self.to_string())
    }

    pub fn is_recoverable(&self) -> bool {
        is_recoverable(&self.to_string())
    }
}

/// How the error handler ended up dealing with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    Unresolved,
    Retried,
    CachedData,
    SimplifiedMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    pub severity: ErrorSeverity,
    pub component: String,
    pub action: String,
    pub recoverable: bool,
    pub user_message: String,
    pub technical_details: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub resolution: Resolution,
}

impl ErrorContext {
    /// Classify `message` and build an unresolved context
    pub fn classify(
        message: &str,
        component: impl Into<String>,
        action: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        let severity = classify_error_severity(message);
        let recoverable = is_recoverable(message);
        Self {
            severity,
            component: component.into(),
            action: action.into(),
            recoverable,
            user_message: user_message_for(severity, recoverable).to_string(),
            technical_details: message.to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries,
            resolution: Resolution::Unresolved,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.recoverable && self.retry_count < self.max_retries
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution != Resolution::Unresolved
    }
}

fn user_message_for(severity: ErrorSeverity, recoverable: bool) -> &'static str {
    match (severity, recoverable) {
        (ErrorSeverity::Critical, _) => "Something went seriously wrong. Please reload and try again.",
        (ErrorSeverity::High, false) => "You don't have access to this action. Please reconnect and try again.",
        (ErrorSeverity::High, true) => "The service is having trouble right now. Please try again shortly.",
        (ErrorSeverity::Medium, _) => "Connection issue detected. Retrying may help.",
        (ErrorSeverity::Low, _) => "Something didn't work as expected. Please try again.",
    }
}
