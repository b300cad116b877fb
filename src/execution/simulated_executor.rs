//! Randomized stand-in for a transaction backend.
//!
//! Each step waits a random delay within the configured range, then fails
//! with `failure_probability`, or (for on-chain swaps) with
//! `slippage_probability`, and otherwise completes with a synthesized
//! transaction hash.

use super::step_executor::{ExecutionConfig, ExecutionResult, StepExecutor, StepUpdateCallback};
use crate::error::Result;
use crate::logging::log_step_operation;
use crate::models::ExecutionStep;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

const ON_CHAIN_FAILURES: &[&str] = &[
    "Transaction reverted: execution reverted",
    "Insufficient gas to complete transaction",
    "Network congestion: transaction dropped from mempool",
    "Nonce conflict: replacement transaction underpriced",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedStepExecutor;

impl SimulatedStepExecutor {
    pub fn new() -> Self {
        Self
    }

    fn step_delay(config: &ExecutionConfig) -> Duration {
        let min = config.step_delay_min.as_millis() as u64;
        let max = config.step_delay_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(fastrand::u64(min..=max))
    }

    fn synthesize_transaction_hash() -> String {
        format!(
            "0x{:016x}{:016x}{:016x}{:016x}",
            fastrand::u64(..),
            fastrand::u64(..),
            fastrand::u64(..),
            fastrand::u64(..)
        )
    }

    /// Independent draws: the general failure first, then slippage for swaps
    fn draw_failure(step: &ExecutionStep, config: &ExecutionConfig) -> Option<String> {
        if config.forced_failures.contains(&step.id) {
            return Some(Self::failure_message(step));
        }
        if fastrand::f64() < config.failure_probability {
            return Some(Self::failure_message(step));
        }
        if step.is_swap() && fastrand::f64() < config.slippage_probability {
            return Some(format!(
                "Slippage tolerance exceeded: price moved {:.1}% during swap",
                0.5 + fastrand::f64() * 2.5
            ));
        }
        None
    }

    fn failure_message(step: &ExecutionStep) -> String {
        if step.is_on_chain() {
            ON_CHAIN_FAILURES[fastrand::usize(..ON_CHAIN_FAILURES.len())].to_string()
        } else {
            format!(
                "Manual confirmation on {} was not received",
                step.cex_platform.as_deref().unwrap_or("the exchange")
            )
        }
    }

    fn record(logs: &mut Vec<String>, line: String) {
        debug!(line = %line, "Step executor log");
        logs.push(line);
    }
}

#[async_trait]
impl StepExecutor for SimulatedStepExecutor {
    #[instrument(skip_all, fields(step_count = steps.len()))]
    async fn execute(
        &self,
        steps: Vec<ExecutionStep>,
        config: &ExecutionConfig,
        cancel: &CancellationToken,
        on_step_update: StepUpdateCallback<'_>,
    ) -> Result<ExecutionResult> {
        let mut result = ExecutionResult::default();

        for (index, mut step) in steps.into_iter().enumerate() {
            if cancel.is_cancelled() {
                Self::record(
                    &mut result.logs,
                    format!("Execution cancelled before step {}", step.step_number),
                );
                result.cancelled = true;
                return Ok(result);
            }

            step.start()?;
            on_step_update(&step, index);
            log_step_operation("start", &step.id, step.step_number, "in-progress", None);
            Self::record(
                &mut result.logs,
                format!("Step {}: {} - started", step.step_number, step.description),
            );

            let started = Instant::now();
            let delay = Self::step_delay(config);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    step.reset()?;
                    on_step_update(&step, index);
                    Self::record(
                        &mut result.logs,
                        format!("Step {}: {} - cancelled", step.step_number, step.description),
                    );
                    result.cancelled = true;
                    return Ok(result);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            let elapsed = started.elapsed();

            if let Some(reason) = Self::draw_failure(&step, config) {
                step.fail(reason.clone(), elapsed)?;
                on_step_update(&step, index);
                log_step_operation("fail", &step.id, step.step_number, "failed", Some(&reason));
                Self::record(
                    &mut result.logs,
                    format!(
                        "Step {}: {} - failed: {}",
                        step.step_number, step.description, reason
                    ),
                );
                result.failed_step = Some(step);
                return Ok(result);
            }

            let transaction_hash = step
                .is_on_chain()
                .then(Self::synthesize_transaction_hash);
            step.complete(transaction_hash, elapsed)?;
            on_step_update(&step, index);
            log_step_operation(
                "complete",
                &step.id,
                step.step_number,
                "completed",
                step.transaction_hash.as_deref(),
            );
            let line = match &step.transaction_hash {
                Some(hash) => format!(
                    "Step {}: {} - completed (tx {})",
                    step.step_number, step.description, hash
                ),
                None => format!("Step {}: {} - completed", step.step_number, step.description),
            };
            Self::record(&mut result.logs, line);
            result.completed_steps.push(step);
        }

        result.success = true;
        Ok(result)
    }

    fn executor_name(&self) -> &'static str {
        "SimulatedStepExecutor"
    }
}
