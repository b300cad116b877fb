use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Kind of operation a loading context tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    Navigation,
    DataFetch,
    WalletConnect,
    FormSubmit,
    AsyncAction,
}

impl OperationType {
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Navigation => "Loading page...",
            Self::DataFetch => "Loading data...",
            Self::WalletConnect => "Connecting to wallet...",
            Self::FormSubmit => "Submitting...",
            Self::AsyncAction => "Processing...",
        }
    }

    pub fn timed_out_message(&self) -> &'static str {
        match self {
            Self::WalletConnect => {
                "Wallet connection is taking longer than expected. Check your wallet extension."
            }
            _ => "This is taking longer than expected...",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation => write!(f, "navigation"),
            Self::DataFetch => write!(f, "data-fetch"),
            Self::WalletConnect => write!(f, "wallet-connect"),
            Self::FormSubmit => write!(f, "form-submit"),
            Self::AsyncAction => write!(f, "async-action"),
        }
    }
}

/// Request to start tracking an operation
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingContext {
    pub id: String,
    pub operation_type: OperationType,
    /// Falls back to the operation type's default message
    pub message: Option<String>,
    /// `None` uses the manager default; zero or negative disables the timer
    pub timeout_ms: Option<i64>,
    /// Progress updates are ignored unless enabled
    pub show_progress: bool,
}

impl LoadingContext {
    pub fn new(id: impl Into<String>, operation_type: OperationType) -> Self {
        Self {
            id: id.into(),
            operation_type,
            message: None,
            timeout_ms: None,
            show_progress: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_progress(mut self) -> Self {
        self.show_progress = true;
        self
    }
}

/// Live state of one tracked operation
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingState {
    pub id: String,
    pub operation_type: OperationType,
    pub is_loading: bool,
    pub message: String,
    /// 0-100 when progress is enabled
    pub progress: Option<f64>,
    pub has_timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub(crate) started: Instant,
}

impl LoadingState {
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

/// Clamp to [0, 100]; NaN and infinities become 0
pub fn sanitize_progress(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
