//! # Step Executor
//!
//! The strategy boundary between orchestration and whatever actually carries
//! out a harvest step. The orchestration only depends on [`StepExecutor`]; the
//! randomized [`super::SimulatedStepExecutor`] and a real transaction backend
//! are interchangeable behind it.
//!
//! ## Contract
//!
//! - Steps are processed strictly in order; step `N+1` never starts before
//!   step `N` resolves.
//! - Every status change is reported through the `on_step_update` callback
//!   with the step's index in the slice handed to `execute`.
//! - The first failed step halts the run; later steps are left untouched.
//! - Cancellation is observed between steps and while a step is pending;
//!   the in-flight step is reported back as `pending`.
//! - Step-level failure is a normal result (`success == false`), not an
//!   `Err`. `Err` is reserved for the backend itself breaking.

use crate::config::ExecutionSettings;
use crate::error::Result;
use crate::models::ExecutionStep;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-step progress callback: `(step, index within the executed slice)`
pub type StepUpdateCallback<'a> = &'a mut (dyn FnMut(&ExecutionStep, usize) + Send);

/// Failure model and pacing for one executor run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub failure_probability: f64,
    /// Only drawn for on-chain swap steps
    pub slippage_probability: f64,
    pub step_delay_min: Duration,
    pub step_delay_max: Duration,
    /// Step ids that always fail, regardless of the random draws
    pub forced_failures: BTreeSet<String>,
}

impl ExecutionConfig {
    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        Self {
            failure_probability: settings.failure_probability,
            slippage_probability: settings.slippage_probability,
            step_delay_min: Duration::from_millis(settings.step_delay_min_ms),
            step_delay_max: Duration::from_millis(settings.step_delay_max_ms),
            forced_failures: BTreeSet::new(),
        }
    }

    /// Never fails, never waits
    pub fn deterministic() -> Self {
        Self {
            failure_probability: 0.0,
            slippage_probability: 0.0,
            step_delay_min: Duration::ZERO,
            step_delay_max: Duration::ZERO,
            forced_failures: BTreeSet::new(),
        }
    }

    pub fn with_failure_probability(mut self, probability: f64) -> Self {
        self.failure_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_slippage_probability(mut self, probability: f64) -> Self {
        self.slippage_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_step_delay(mut self, min: Duration, max: Duration) -> Self {
        self.step_delay_min = min.min(max);
        self.step_delay_max = max.max(min);
        self
    }

    pub fn with_forced_failure(mut self, step_id: impl Into<String>) -> Self {
        self.forced_failures.insert(step_id.into());
        self
    }

    /// Configuration for a retry run. With `retry_failure_probability` set,
    /// the failure probability is lowered to it (never raised).
    pub fn for_retry(&self, retry_failure_probability: Option<f64>) -> Self {
        let mut config = self.clone();
        if let Some(reduced) = retry_failure_probability {
            config.failure_probability = config.failure_probability.min(reduced.clamp(0.0, 1.0));
        }
        config
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::from_settings(&ExecutionSettings::default())
    }
}

/// Outcome of one executor run over a slice of steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Steps that completed during this run, in order
    pub completed_steps: Vec<ExecutionStep>,
    /// The step that halted the run, carrying its `error_message`
    pub failed_step: Option<ExecutionStep>,
    pub cancelled: bool,
    /// Human-readable transition log, one line per transition
    pub logs: Vec<String>,
}

impl ExecutionResult {
    pub fn failure_reason(&self) -> Option<String> {
        self.failed_step.as_ref().map(|step| {
            step.error_message
                .clone()
                .unwrap_or_else(|| format!("Step {} failed", step.step_number))
        })
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `steps` in order until one fails, the token is cancelled, or all complete
    async fn execute(
        &self,
        steps: Vec<ExecutionStep>,
        config: &ExecutionConfig,
        cancel: &CancellationToken,
        on_step_update: StepUpdateCallback<'_>,
    ) -> Result<ExecutionResult>;

    fn executor_name(&self) -> &'static str;
}
