use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Tracked user/wallet state that prerequisites are checked against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateState {
    pub wallet_connected: bool,
    pub wallet_address: Option<String>,
    /// Token addresses with an active approval, lowercased
    pub approvals: HashSet<String>,
    /// Balance per token symbol or address, lowercased key
    pub balances: HashMap<String, f64>,
    /// ISO region code of the user, when known
    pub region: Option<String>,
}

impl GateState {
    pub fn has_approval(&self, token_address: &str) -> bool {
        self.approvals.contains(&token_address.to_lowercase())
    }

    pub fn balance_of(&self, token: &str) -> f64 {
        self.balances
            .get(&token.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRequirement {
    pub token: String,
    pub minimum: f64,
}

/// Window during which an action is allowed; start inclusive, end exclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeWindow {
    Absolute {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Times of day in UTC; wraps over midnight when `end < start`
    Daily { start: NaiveTime, end: NaiveTime },
}

impl TimeWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Absolute { start, end } => *start <= now && now < *end,
            Self::Daily { start, end } => {
                let time = now.time();
                if start <= end {
                    *start <= time && time < *end
                } else {
                    time >= *start || time < *end
                }
            }
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute { start, end } => write!(
                f,
                "{} and {}",
                start.format("%Y-%m-%d %H:%M UTC"),
                end.format("%Y-%m-%d %H:%M UTC")
            ),
            Self::Daily { start, end } => write!(
                f,
                "{} and {} UTC",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
        }
    }
}

type CheckFn = Arc<dyn Fn(&GateState) -> bool + Send + Sync>;

/// Caller-supplied prerequisite, evaluated last
#[derive(Clone)]
pub struct CustomCheck {
    pub id: String,
    pub label: String,
    pub message: String,
    pub required: bool,
    check: CheckFn,
}

impl CustomCheck {
    pub fn new<F>(id: impl Into<String>, label: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&GateState) -> bool + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            label: label.into(),
            message: message.into(),
            required: true,
            check: Arc::new(check),
        }
    }

    /// Reported but never blocks the action
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn evaluate(&self, state: &GateState) -> bool {
        (self.check)(state)
    }
}

impl fmt::Debug for CustomCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCheck")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("required", &self.required)
            .finish()
    }
}

/// What an action needs before it may be enabled
#[derive(Debug, Clone, Default)]
pub struct ActionConfig {
    pub require_wallet: bool,
    pub required_approvals: Vec<String>,
    pub min_balance: Option<BalanceRequirement>,
    /// Regions where the action is unavailable
    pub restricted_regions: Vec<String>,
    pub time_window: Option<TimeWindow>,
    pub custom_checks: Vec<CustomCheck>,
}

impl ActionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_wallet(mut self) -> Self {
        self.require_wallet = true;
        self
    }

    pub fn require_approval(mut self, token_address: impl Into<String>) -> Self {
        self.required_approvals.push(token_address.into());
        self
    }

    pub fn require_balance(mut self, token: impl Into<String>, minimum: f64) -> Self {
        self.min_balance = Some(BalanceRequirement {
            token: token.into(),
            minimum,
        });
        self
    }

    pub fn restrict_region(mut self, region: impl Into<String>) -> Self {
        self.restricted_regions.push(region.into());
        self
    }

    pub fn within(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_check(mut self, check: CustomCheck) -> Self {
        self.custom_checks.push(check);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrerequisiteKind {
    Wallet,
    Approval,
    Balance,
    Geo,
    Time,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    pub id: String,
    pub kind: PrerequisiteKind,
    pub label: String,
    pub met: bool,
    pub required: bool,
    /// What the user has to do when unmet
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvaluation {
    pub enabled: bool,
    /// In evaluation order: wallet, approvals, balance, geo, time, custom
    pub prerequisites: Vec<Prerequisite>,
    pub disabled_reason: Option<String>,
}

impl ActionEvaluation {
    pub fn unmet(&self) -> impl Iterator<Item = &Prerequisite> {
        self.prerequisites.iter().filter(|prerequisite| !prerequisite.met)
    }
}
