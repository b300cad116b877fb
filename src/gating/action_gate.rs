//! # Action Gate
//!
//! Tracks wallet, approval, balance and region state and decides whether an
//! action is enabled. Evaluation is a pure function of that state, the passed
//! [`ActionConfig`] and the evaluation instant; it never mutates anything.

use super::prerequisites::{
    ActionConfig, ActionEvaluation, GateState, Prerequisite, PrerequisiteKind,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ActionGate {
    state: RwLock<GateState>,
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: GateState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn state(&self) -> GateState {
        self.state.read().clone()
    }

    pub fn connect_wallet(&self, address: impl Into<String>) {
        let address = address.into();
        debug!(wallet = %address, "Wallet connected");
        let mut state = self.state.write();
        state.wallet_connected = true;
        state.wallet_address = Some(address);
    }

    /// Disconnecting also drops approvals and balances, which are per wallet
    pub fn disconnect_wallet(&self) {
        debug!("Wallet disconnected");
        let mut state = self.state.write();
        state.wallet_connected = false;
        state.wallet_address = None;
        state.approvals.clear();
        state.balances.clear();
    }

    pub fn set_approval(&self, token_address: &str, approved: bool) {
        let key = token_address.to_lowercase();
        let mut state = self.state.write();
        if approved {
            state.approvals.insert(key);
        } else {
            state.approvals.remove(&key);
        }
    }

    pub fn set_balance(&self, token: &str, amount: f64) {
        self.state.write().balances.insert(token.to_lowercase(), amount);
    }

    pub fn set_region(&self, region: Option<String>) {
        self.state.write().region = region;
    }

    pub fn evaluate_action(&self, config: &ActionConfig) -> ActionEvaluation {
        self.evaluate_action_at(config, Utc::now())
    }

    pub fn evaluate_action_at(&self, config: &ActionConfig, now: DateTime<Utc>) -> ActionEvaluation {
        let state = self.state.read().clone();
        evaluate(&state, config, now)
    }
}

/// Check every configured prerequisite against `state` at `now`
pub fn evaluate(state: &GateState, config: &ActionConfig, now: DateTime<Utc>) -> ActionEvaluation {
    let mut prerequisites = Vec::new();

    if config.require_wallet {
        prerequisites.push(Prerequisite {
            id: "wallet".to_string(),
            kind: PrerequisiteKind::Wallet,
            label: "Wallet connected".to_string(),
            met: state.wallet_connected,
            required: true,
            message: "Connect your wallet to continue".to_string(),
        });
    }

    for token in &config.required_approvals {
        prerequisites.push(Prerequisite {
            id: format!("approval:{}", token.to_lowercase()),
            kind: PrerequisiteKind::Approval,
            label: format!("Approval for {token}"),
            met: state.has_approval(token),
            required: true,
            message: format!("Approve {token} for spending to continue"),
        });
    }

    if let Some(requirement) = &config.min_balance {
        let available = state.balance_of(&requirement.token);
        prerequisites.push(Prerequisite {
            id: format!("balance:{}", requirement.token.to_lowercase()),
            kind: PrerequisiteKind::Balance,
            label: format!("Minimum {} {}", requirement.minimum, requirement.token),
            met: available >= requirement.minimum,
            required: true,
            message: format!(
                "Insufficient {} balance: {} available, {} required",
                requirement.token, available, requirement.minimum
            ),
        });
    }

    if !config.restricted_regions.is_empty() {
        // Unknown region counts as allowed
        let restricted = state.region.as_deref().filter(|region| {
            config
                .restricted_regions
                .iter()
                .any(|restricted| restricted.eq_ignore_ascii_case(region))
        });
        prerequisites.push(Prerequisite {
            id: "geo".to_string(),
            kind: PrerequisiteKind::Geo,
            label: "Available in your region".to_string(),
            met: restricted.is_none(),
            required: true,
            message: format!(
                "This action is not available in your region ({})",
                restricted.unwrap_or("unknown")
            ),
        });
    }

    if let Some(window) = &config.time_window {
        prerequisites.push(Prerequisite {
            id: "time".to_string(),
            kind: PrerequisiteKind::Time,
            label: "Within allowed time window".to_string(),
            met: window.contains(now),
            required: true,
            message: format!("This action is only available between {window}"),
        });
    }

    for check in &config.custom_checks {
        prerequisites.push(Prerequisite {
            id: check.id.clone(),
            kind: PrerequisiteKind::Custom,
            label: check.label.clone(),
            met: check.evaluate(state),
            required: check.required,
            message: check.message.clone(),
        });
    }

    let disabled_reason = prerequisites
        .iter()
        .find(|prerequisite| prerequisite.required && !prerequisite.met)
        .map(|prerequisite| prerequisite.message.clone());

    ActionEvaluation {
        enabled: disabled_reason.is_none(),
        prerequisites,
        disabled_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gating::prerequisites::CustomCheck;

    #[test]
    fn test_wallet_gate() {
        let gate = ActionGate::new();
        let config = ActionConfig::new().require_wallet();

        let evaluation = gate.evaluate_action(&config);
        assert!(!evaluation.enabled);
        assert!(evaluation
            .disabled_reason
            .as_deref()
            .unwrap()
            .contains("Connect your wallet"));

        gate.connect_wallet("0xabc");
        let evaluation = gate.evaluate_action(&config);
        assert!(evaluation.enabled);
        assert!(evaluation.disabled_reason.is_none());
    }

    #[test]
    fn test_first_unmet_in_evaluation_order_wins() {
        let gate = ActionGate::new();
        gate.set_region(Some("US".to_string()));
        let config = ActionConfig::new()
            .restrict_region("us")
            .require_balance("USDC", 100.0)
            .require_approval("0xToken");

        let evaluation = gate.evaluate_action(&config);
        assert_eq!(evaluation.prerequisites.len(), 3);
        assert_eq!(evaluation.unmet().count(), 3);
        assert!(evaluation.disabled_reason.unwrap().starts_with("Approve 0xToken"));
    }

    #[test]
    fn test_unknown_region_is_allowed() {
        let gate = ActionGate::new();
        let evaluation = gate.evaluate_action(&ActionConfig::new().restrict_region("KP"));
        assert!(evaluation.enabled);
    }

    #[test]
    fn test_balance_and_approval_met() {
        let gate = ActionGate::new();
        gate.connect_wallet("0xabc");
        gate.set_approval("0xTOKEN", true);
        gate.set_balance("usdc", 150.0);
        let config = ActionConfig::new()
            .require_wallet()
            .require_approval("0xtoken")
            .require_balance("USDC", 100.0);

        assert!(gate.evaluate_action(&config).enabled);

        gate.disconnect_wallet();
        let evaluation = gate.evaluate_action(&config);
        assert!(!evaluation.enabled);
        assert_eq!(evaluation.unmet().count(), 3);
    }

    #[test]
    fn test_optional_custom_check_never_blocks() {
        let gate = ActionGate::new();
        let config = ActionConfig::new()
            .with_check(CustomCheck::new("kyc", "KYC complete", "Complete KYC", |_| false).optional());

        let evaluation = gate.evaluate_action(&config);
        assert!(evaluation.enabled);
        assert!(!evaluation.prerequisites[0].met);
    }

    #[test]
    fn test_evaluation_does_not_mutate_state() {
        let gate = ActionGate::new();
        gate.connect_wallet("0xabc");
        let before = gate.state();
        let config = ActionConfig::new()
            .require_wallet()
            .with_check(CustomCheck::new("any", "Any", "Nope", |state| state.wallet_connected));
        let first = gate.evaluate_action(&config);
        let second = gate.evaluate_action(&config);
        assert_eq!(first, second);
        assert_eq!(gate.state(), before);
    }
}
