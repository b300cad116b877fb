//! # Harvest Session
//!
//! The unit of orchestration: an ordered list of execution steps plus a
//! status derived from them. `status` is recomputed from the steps after every
//! mutation, so `completed` holds exactly when every step is completed and
//! `failed` exactly when some step is failed.

use super::execution_step::ExecutionStep;
use crate::error::{HarvestError, Result};
use crate::state_machine::{SessionStatus, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestSession {
    pub session_id: String,
    pub status: SessionStatus,
    /// Ordered by `step_number` ascending
    pub execution_steps: Vec<ExecutionStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HarvestSession {
    /// Create a draft session; steps are ordered by step number
    pub fn new(mut steps: Vec<ExecutionStep>) -> Self {
        steps.sort_by_key(|step| step.step_number);
        let now = Utc::now();
        let mut session = Self {
            session_id: Uuid::new_v4().to_string(),
            status: SessionStatus::Draft,
            execution_steps: steps,
            created_at: now,
            updated_at: now,
        };
        session.recompute_status();
        session
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Refresh `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Derive `status` from the steps
    pub fn recompute_status(&mut self) -> SessionStatus {
        self.status = if self
            .execution_steps
            .iter()
            .any(|step| step.status == StepStatus::Failed)
        {
            SessionStatus::Failed
        } else if !self.execution_steps.is_empty()
            && self
                .execution_steps
                .iter()
                .all(|step| step.status == StepStatus::Completed)
        {
            SessionStatus::Completed
        } else {
            SessionStatus::Draft
        };
        self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn first_failed_index(&self) -> Option<usize> {
        self.execution_steps
            .iter()
            .position(|step| step.status == StepStatus::Failed)
    }

    pub fn current_step_index(&self) -> Option<usize> {
        self.execution_steps
            .iter()
            .position(|step| step.status == StepStatus::InProgress)
    }

    pub fn completed_count(&self) -> usize {
        self.execution_steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count()
    }

    /// Where a retry picks up: the first failed step, or the first
    /// unfinished step of a partially completed (cancelled) session
    pub fn resume_index(&self) -> Option<usize> {
        if let Some(index) = self.first_failed_index() {
            return Some(index);
        }
        if self.is_fresh() || self.is_completed() {
            return None;
        }
        self.execution_steps
            .iter()
            .position(|step| step.status != StepStatus::Completed)
    }

    /// Whether no step has started yet
    pub fn is_fresh(&self) -> bool {
        self.execution_steps
            .iter()
            .all(|step| step.status == StepStatus::Pending)
    }

    /// Check identity, numbering and progression invariants
    pub fn validate(&self) -> Result<()> {
        if self.execution_steps.is_empty() {
            return Err(HarvestError::Validation(format!(
                "session {} has no execution steps",
                self.session_id
            )));
        }

        let mut seen = HashSet::new();
        for (index, step) in self.execution_steps.iter().enumerate() {
            if !seen.insert(step.id.as_str()) {
                return Err(HarvestError::Validation(format!(
                    "duplicate step id '{}' in session {}",
                    step.id, self.session_id
                )));
            }
            let expected = index as u32 + 1;
            if step.step_number != expected {
                return Err(HarvestError::Validation(format!(
                    "step '{}' has step number {} but position {} in session {}",
                    step.id, step.step_number, expected, self.session_id
                )));
            }
        }

        // Completed prefix, then at most one current-or-failed step, then pending
        let frontier = self
            .execution_steps
            .iter()
            .position(|step| step.status != StepStatus::Completed)
            .unwrap_or(self.execution_steps.len());
        if let Some(offender) = self
            .execution_steps
            .iter()
            .skip(frontier + 1)
            .find(|step| step.status != StepStatus::Pending)
        {
            return Err(HarvestError::Validation(format!(
                "step '{}' is {} after an unfinished step in session {}",
                offender.id, offender.status, self.session_id
            )));
        }

        Ok(())
    }

    /// Reset the step at `index` and every later step to pending, keeping the
    /// completed prefix untouched
    pub fn reset_from(&mut self, index: usize) -> Result<()> {
        for step in self.execution_steps.iter_mut().skip(index) {
            step.reset()?;
        }
        self.recompute_status();
        self.touch();
        Ok(())
    }

    /// Write back `steps` produced by a run that started at `offset`
    pub fn merge_steps(&mut self, offset: usize, steps: &[ExecutionStep]) {
        for (position, step) in steps.iter().enumerate() {
            if let Some(slot) = self.execution_steps.get_mut(offset + position) {
                *slot = step.clone();
            }
        }
        self.recompute_status();
        self.touch();
    }
}
