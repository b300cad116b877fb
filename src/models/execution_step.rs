//! # Execution Step
//!
//! One atomic unit of a harvest session: either an on-chain transaction or a
//! manual action on a centralized exchange.
//!
//! Status changes go through [`StepStateMachine`] so that the fields tied to a
//! status stay consistent: `transaction_hash` exists only on completed on-chain
//! steps, `error_message` only on failed steps, and both are cleared on reset.

use crate::state_machine::{StateMachineResult, StepEvent, StepStateMachine, StepStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a step is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    OnChain,
    CexManual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub id: String,
    /// 1-based position within the session
    pub step_number: u32,
    pub description: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Externally computed risk rating (0-10), informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cex_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ExecutionStep {
    fn new(
        id: impl Into<String>,
        step_number: u32,
        description: impl Into<String>,
        step_type: StepType,
    ) -> Self {
        Self {
            id: id.into(),
            step_number,
            description: description.into(),
            step_type,
            status: StepStatus::Pending,
            transaction_hash: None,
            error_message: None,
            guardian_score: None,
            duration_ms: None,
            cex_platform: None,
            metadata: None,
        }
    }

    pub fn on_chain(id: impl Into<String>, step_number: u32, description: impl Into<String>) -> Self {
        Self::new(id, step_number, description, StepType::OnChain)
    }

    pub fn cex_manual(
        id: impl Into<String>,
        step_number: u32,
        description: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        let mut step = Self::new(id, step_number, description, StepType::CexManual);
        step.cex_platform = Some(platform.into());
        step
    }

    /// Attach a guardian score, clamped to 0-10
    pub fn with_guardian_score(mut self, score: f64) -> Self {
        self.guardian_score = Some(if score.is_finite() { score.clamp(0.0, 10.0) } else { 0.0 });
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_on_chain(&self) -> bool {
        self.step_type == StepType::OnChain
    }

    /// On-chain swap steps are subject to slippage
    pub fn is_swap(&self) -> bool {
        self.is_on_chain() && self.description.to_ascii_lowercase().contains("swap")
    }

    /// pending → in-progress
    pub fn start(&mut self) -> StateMachineResult<()> {
        self.status = StepStateMachine::determine_target_state(self.status, &StepEvent::Start)?;
        self.error_message = None;
        Ok(())
    }

    /// in-progress → completed; the hash is only kept for on-chain steps
    pub fn complete(
        &mut self,
        transaction_hash: Option<String>,
        duration: Duration,
    ) -> StateMachineResult<()> {
        self.status = StepStateMachine::determine_target_state(self.status, &StepEvent::Complete)?;
        self.transaction_hash = if self.is_on_chain() {
            transaction_hash
        } else {
            None
        };
        self.duration_ms = Some(duration.as_millis() as u64);
        self.error_message = None;
        Ok(())
    }

    /// in-progress → failed
    pub fn fail(&mut self, message: impl Into<String>, duration: Duration) -> StateMachineResult<()> {
        let message = message.into();
        self.status = StepStateMachine::determine_target_state(
            self.status,
            &StepEvent::Fail(message.clone()),
        )?;
        self.error_message = Some(message);
        self.transaction_hash = None;
        self.duration_ms = Some(duration.as_millis() as u64);
        Ok(())
    }

    /// failed | in-progress | pending → pending, clearing run artifacts
    pub fn reset(&mut self) -> StateMachineResult<()> {
        self.status = StepStateMachine::determine_target_state(self.status, &StepEvent::Reset)?;
        self.error_message = None;
        self.transaction_hash = None;
        self.duration_ms = None;
        Ok(())
    }
}
