//! # Action Engine
//!
//! Session-level orchestration over a [`StepExecutor`]. The engine owns the
//! `idle → executing → {completed | failed}` lifecycle, merges executor
//! results back into the caller's [`HarvestSession`], and reports every
//! terminal path through the `on_success` / `on_error` callbacks as well as
//! the returned [`ExecutionOutcome`].
//!
//! ## Guarantees
//!
//! - At most one run is in flight per engine. A second `execute_session` or
//!   `retry_execution` while executing is rejected, never run concurrently.
//! - Executor errors and panics are caught; they mark the interrupted step
//!   failed and surface through `on_error`. Nothing escapes as a panic.
//! - Callbacks run once the run is torn down and the in-flight flag is
//!   released, so they observe the final snapshot and may schedule a retry.
//!   A panicking callback is logged and swallowed.
//! - Retry resets the first failed (or, after a cancel, first unfinished)
//!   step and everything after it, runs only that suffix, and leaves the
//!   completed prefix untouched.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use harvest_engine::models::{ExecutionStep, HarvestSession};
//! use harvest_engine::orchestration::{ActionEngine, ActionEngineConfig};
//! use harvest_engine::execution::SimulatedStepExecutor;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let engine = ActionEngine::new(
//!     Arc::new(SimulatedStepExecutor::new()),
//!     ActionEngineConfig::default(),
//! );
//! engine.on_error(|message, _session| eprintln!("harvest failed: {message}"));
//!
//! let mut session = HarvestSession::new(vec![
//!     ExecutionStep::on_chain("approve", 1, "Approve USDC"),
//!     ExecutionStep::on_chain("swap", 2, "Swap USDC for ETH"),
//! ]);
//! let outcome = engine.execute_session(&mut session).await;
//! println!("{outcome:?}");
//! # }
//! ```

use crate::config::ExecutionSettings;
use crate::constants::system::EXECUTION_PROGRESS_PREFIX;
use crate::error::HarvestError;
use crate::events::{EventPublisher, HarvestEvent};
use crate::execution::{ExecutionConfig, ExecutionResult, StepExecutor};
use crate::loading::{LoadingContext, LoadingStateManager, OperationType};
use crate::logging::{log_error, log_session_operation};
use crate::models::{ExecutionStep, HarvestSession};
use crate::state_machine::{EngineEvent, EngineState, EngineStateMachine, StepStatus};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type SuccessCallback = Arc<dyn Fn(&HarvestSession) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&str, &HarvestSession) + Send + Sync>;

/// Callback owed to the caller once a run has been torn down
enum Report {
    Success,
    Error(String),
}

type Finished = (ExecutionOutcome, Report);

/// Why an orchestration call refused to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    AlreadyExecuting,
    NothingToRetry,
    InvalidSession(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExecuting => write!(f, "an execution is already in progress"),
            Self::NothingToRetry => write!(f, "session has no failed or unfinished step to retry"),
            Self::InvalidSession(reason) => write!(f, "invalid session: {reason}"),
        }
    }
}

/// Result of `execute_session` / `retry_execution`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Failed {
        reason: String,
        failed_step_id: Option<String>,
    },
    Cancelled,
    Rejected(RejectionReason),
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Live view of the engine, refreshed on every step update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub is_executing: bool,
    /// Index into `steps` of the step currently in progress
    pub current_step_index: Option<usize>,
    pub steps: Vec<ExecutionStep>,
    pub logs: Vec<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionEngineConfig {
    pub execution: ExecutionConfig,
    /// Failure probability ceiling for retry runs; `None` reuses `execution`
    pub retry_failure_probability: Option<f64>,
}

impl ActionEngineConfig {
    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        Self {
            execution: ExecutionConfig::from_settings(settings),
            retry_failure_probability: settings.retry_failure_probability,
        }
    }
}

impl Default for ActionEngineConfig {
    fn default() -> Self {
        Self::from_settings(&ExecutionSettings::default())
    }
}

/// Clears the in-flight flag when a run ends, however it ends
struct ExecutionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ActionEngine {
    executor: Arc<dyn StepExecutor>,
    config: RwLock<ActionEngineConfig>,
    machine: Mutex<EngineStateMachine>,
    snapshot: Arc<Mutex<EngineSnapshot>>,
    is_executing: AtomicBool,
    cancel_token: Mutex<Option<CancellationToken>>,
    on_success: RwLock<Option<SuccessCallback>>,
    on_error: RwLock<Option<ErrorCallback>>,
    events: EventPublisher,
    loading: Option<LoadingStateManager>,
}

impl fmt::Debug for ActionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEngine")
            .field("executor", &self.executor.executor_name())
            .field("state", &self.machine.lock().current_state())
            .field("is_executing", &self.is_executing())
            .finish()
    }
}

impl ActionEngine {
    pub fn new(executor: Arc<dyn StepExecutor>, config: ActionEngineConfig) -> Self {
        Self {
            executor,
            config: RwLock::new(config),
            machine: Mutex::new(EngineStateMachine::new()),
            snapshot: Arc::new(Mutex::new(EngineSnapshot::default())),
            is_executing: AtomicBool::new(false),
            cancel_token: Mutex::new(None),
            on_success: RwLock::new(None),
            on_error: RwLock::new(None),
            events: EventPublisher::default(),
            loading: None,
        }
    }

    /// Report run progress as an `async-action` loading context
    pub fn with_loading_manager(mut self, loading: LoadingStateManager) -> Self {
        self.loading = Some(loading);
        self
    }

    pub fn with_event_publisher(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn on_success<F>(&self, callback: F)
    where
        F: Fn(&HarvestSession) + Send + Sync + 'static,
    {
        *self.on_success.write() = Some(Arc::new(callback));
    }

    /// Called with a human-readable reason and the session as it stands
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str, &HarvestSession) + Send + Sync + 'static,
    {
        *self.on_error.write() = Some(Arc::new(callback));
    }

    pub fn config(&self) -> ActionEngineConfig {
        self.config.read().clone()
    }

    /// Applies to the next run; an in-flight run keeps its configuration
    pub fn set_execution_config(&self, config: ActionEngineConfig) {
        *self.config.write() = config;
    }

    pub fn event_publisher(&self) -> &EventPublisher {
        &self.events
    }

    pub fn is_executing(&self) -> bool {
        self.is_executing.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EngineState {
        self.machine.lock().current_state()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.lock().clone()
    }

    /// Cancel the in-flight run; returns false when nothing is running
    pub fn cancel(&self) -> bool {
        match self.cancel_token.lock().as_ref() {
            Some(token) => {
                info!("Cancelling in-flight harvest execution");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn try_begin(&self) -> Option<ExecutionGuard<'_>> {
        self.is_executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ExecutionGuard {
                flag: &self.is_executing,
            })
    }

    /// Run every step of a fresh session
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    pub async fn execute_session(&self, session: &mut HarvestSession) -> ExecutionOutcome {
        let Some(guard) = self.try_begin() else {
            warn!("Rejected execute_session: another execution is in flight");
            return ExecutionOutcome::Rejected(RejectionReason::AlreadyExecuting);
        };

        if let Err(rejection) = self.check_runnable(session) {
            return rejection;
        }
        if !session.is_fresh() {
            return self.reject_invalid(
                session,
                "session has already been executed; retry it instead".to_string(),
            );
        }

        if let Err(error) = self.machine.lock().transition(&EngineEvent::Start) {
            warn!(error = %error, "Engine refused to start");
            return ExecutionOutcome::Rejected(RejectionReason::AlreadyExecuting);
        }

        log_session_operation("execute", &session.session_id, "executing", None);
        self.events.publish(HarvestEvent::SessionStarted {
            session_id: session.session_id.clone(),
            total_steps: session.execution_steps.len(),
        });

        let config = self.config.read().execution.clone();
        let (outcome, report) = self.run(session, 0, config).await;
        drop(guard);
        self.deliver(report, session);
        outcome
    }

    /// Re-run a failed or cancelled session from where it stopped
    #[instrument(skip_all, fields(session_id = %session.session_id))]
    pub async fn retry_execution(&self, session: &mut HarvestSession) -> ExecutionOutcome {
        let Some(guard) = self.try_begin() else {
            warn!("Rejected retry_execution: another execution is in flight");
            return ExecutionOutcome::Rejected(RejectionReason::AlreadyExecuting);
        };

        if let Err(rejection) = self.check_runnable(session) {
            return rejection;
        }
        let Some(resume_index) = session.resume_index() else {
            debug!("Nothing to retry");
            return ExecutionOutcome::Rejected(RejectionReason::NothingToRetry);
        };

        // A session failed by an earlier engine instance arrives with this engine idle
        let event = match self.machine.lock().current_state() {
            EngineState::Failed => EngineEvent::Retry,
            _ => EngineEvent::Start,
        };
        if let Err(error) = self.machine.lock().transition(&event) {
            warn!(error = %error, "Engine refused to retry");
            return ExecutionOutcome::Rejected(RejectionReason::AlreadyExecuting);
        }

        if let Err(error) = session.reset_from(resume_index) {
            let message = format!("Could not reset session for retry: {error}");
            let _ = self.machine.lock().transition(&EngineEvent::Fail(message.clone()));
            self.deliver(Report::Error(message.clone()), session);
            return ExecutionOutcome::Failed {
                reason: message,
                failed_step_id: None,
            };
        }

        log_session_operation(
            "retry",
            &session.session_id,
            "executing",
            Some(&format!("from step index {resume_index}")),
        );
        self.events.publish(HarvestEvent::RetryStarted {
            session_id: session.session_id.clone(),
            from_step_index: resume_index,
        });

        let config = {
            let config = self.config.read();
            config.execution.for_retry(config.retry_failure_probability)
        };
        let (outcome, report) = self.run(session, resume_index, config).await;
        drop(guard);
        self.deliver(report, session);
        outcome
    }

    fn check_runnable(&self, session: &HarvestSession) -> Result<(), ExecutionOutcome> {
        session
            .validate()
            .map_err(|error| self.reject_invalid(session, error.to_string()))
    }

    fn reject_invalid(&self, session: &HarvestSession, reason: String) -> ExecutionOutcome {
        warn!(reason = %reason, "Rejected invalid session");
        self.snapshot.lock().last_error = Some(reason.clone());
        self.deliver(Report::Error(reason.clone()), session);
        ExecutionOutcome::Rejected(RejectionReason::InvalidSession(reason))
    }

    fn progress_context_id(session_id: &str) -> String {
        format!("{EXECUTION_PROGRESS_PREFIX}:{session_id}")
    }

    async fn run(
        &self,
        session: &mut HarvestSession,
        offset: usize,
        config: ExecutionConfig,
    ) -> Finished {
        let token = CancellationToken::new();
        *self.cancel_token.lock() = Some(token.clone());

        let session_id = session.session_id.clone();
        let total = session.execution_steps.len();
        let progress_id = Self::progress_context_id(&session_id);

        {
            let mut snapshot = self.snapshot.lock();
            *snapshot = EngineSnapshot {
                state: EngineState::Executing,
                is_executing: true,
                current_step_index: None,
                steps: session.execution_steps.clone(),
                logs: Vec::new(),
                last_error: None,
            };
        }

        if let Some(loading) = &self.loading {
            loading.show_loading(
                LoadingContext::new(progress_id.clone(), OperationType::AsyncAction)
                    .with_message(format!("Executing {total} harvest steps..."))
                    .with_timeout_ms(0)
                    .with_progress(),
            );
            loading.update_progress(&progress_id, percent(session.completed_count(), total));
        }

        let mut completed = session.completed_count();
        let snapshot = Arc::clone(&self.snapshot);
        let events = self.events.clone();
        let loading = self.loading.clone();
        let callback_session_id = session_id.clone();
        let callback_progress_id = progress_id.clone();
        let mut on_step_update = move |step: &ExecutionStep, index: usize| {
            let position = offset + index;
            {
                let mut snapshot = snapshot.lock();
                if let Some(slot) = snapshot.steps.get_mut(position) {
                    *slot = step.clone();
                }
                snapshot.current_step_index =
                    (step.status == StepStatus::InProgress).then_some(position);
            }
            events.publish(HarvestEvent::step_updated(&callback_session_id, position, step));
            if step.status == StepStatus::Completed {
                completed += 1;
                if let Some(loading) = &loading {
                    loading.update_progress(&callback_progress_id, percent(completed, total));
                }
            }
        };

        let steps = session.execution_steps[offset..].to_vec();
        let executed = AssertUnwindSafe(self.executor.execute(
            steps,
            &config,
            &token,
            &mut on_step_update,
        ))
        .catch_unwind()
        .await;

        let (outcome, report) = match executed {
            Ok(Ok(result)) => self.apply_result(session, offset, result),
            Ok(Err(error)) => self.apply_executor_error(session, offset, error.to_string()),
            Err(panic) => self.apply_executor_error(
                session,
                offset,
                format!("Step executor panicked: {}", panic_message(&*panic)),
            ),
        };

        *self.cancel_token.lock() = None;
        if let Some(loading) = &self.loading {
            loading.hide_loading(&progress_id);
        }
        {
            let mut snapshot = self.snapshot.lock();
            snapshot.state = self.machine.lock().current_state();
            snapshot.is_executing = false;
            snapshot.current_step_index = None;
            snapshot.steps = session.execution_steps.clone();
        }

        (outcome, report)
    }

    fn apply_result(
        &self,
        session: &mut HarvestSession,
        offset: usize,
        result: ExecutionResult,
    ) -> Finished {
        let mut produced = result.completed_steps.clone();
        if let Some(failed) = &result.failed_step {
            produced.push(failed.clone());
        }
        session.merge_steps(offset, &produced);
        self.snapshot.lock().logs = result.logs.clone();

        if result.cancelled {
            return self.finish_cancelled(session);
        }

        if let Some(failed) = &result.failed_step {
            let reason = result
                .failure_reason()
                .unwrap_or_else(|| "Step failed".to_string());
            let message = HarvestError::StepExecutionFailure {
                step_id: failed.id.clone(),
                step_number: failed.step_number,
                reason: reason.clone(),
            }
            .to_string();
            return self.finish_failed(session, message, reason, Some(failed.id.clone()));
        }

        if !session.is_completed() {
            let pending = session.execution_steps.len() - session.completed_count();
            let reason = format!("Executor reported success but {pending} steps did not complete");
            return self.fail_interrupted(session, offset, reason);
        }

        self.finish_completed(session)
    }

    fn apply_executor_error(
        &self,
        session: &mut HarvestSession,
        offset: usize,
        reason: String,
    ) -> Finished {
        log_error("action_engine", "execute", &reason, Some(&session.session_id));
        let live: Vec<ExecutionStep> = self
            .snapshot
            .lock()
            .steps
            .iter()
            .skip(offset)
            .cloned()
            .collect();
        session.merge_steps(offset, &live);
        self.fail_interrupted(session, offset, reason)
    }

    /// Mark the step at the execution frontier failed so the session is retryable
    fn fail_interrupted(
        &self,
        session: &mut HarvestSession,
        offset: usize,
        reason: String,
    ) -> Finished {
        let frontier = session
            .execution_steps
            .iter()
            .enumerate()
            .skip(offset)
            .find(|(_, step)| step.status != StepStatus::Completed)
            .map(|(index, _)| index);

        let mut failed_step_id = None;
        if let Some(index) = frontier {
            let step = &mut session.execution_steps[index];
            if step.status == StepStatus::Pending {
                let _ = step.start();
            }
            if step.status == StepStatus::InProgress {
                let _ = step.fail(reason.clone(), std::time::Duration::ZERO);
            }
            failed_step_id = Some(step.id.clone());
            for later in session.execution_steps.iter_mut().skip(index + 1) {
                let _ = later.reset();
            }
            session.recompute_status();
            session.touch();
        }

        self.finish_failed(session, reason.clone(), reason, failed_step_id)
    }

    fn finish_completed(&self, session: &mut HarvestSession) -> Finished {
        if let Err(error) = self.machine.lock().transition(&EngineEvent::Complete) {
            warn!(error = %error, "Unexpected engine state on completion");
        }
        log_session_operation("execute", &session.session_id, "completed", None);
        self.events.publish(HarvestEvent::SessionCompleted {
            session_id: session.session_id.clone(),
        });
        (ExecutionOutcome::Completed, Report::Success)
    }

    fn finish_failed(
        &self,
        session: &mut HarvestSession,
        message: String,
        reason: String,
        failed_step_id: Option<String>,
    ) -> Finished {
        if let Err(error) = self
            .machine
            .lock()
            .transition(&EngineEvent::Fail(reason.clone()))
        {
            warn!(error = %error, "Unexpected engine state on failure");
        }
        log_session_operation("execute", &session.session_id, "failed", Some(&message));
        self.events.publish(HarvestEvent::SessionFailed {
            session_id: session.session_id.clone(),
            status: session.status,
            reason: reason.clone(),
        });

        self.snapshot.lock().last_error = Some(message.clone());
        (
            ExecutionOutcome::Failed {
                reason,
                failed_step_id,
            },
            Report::Error(message),
        )
    }

    fn finish_cancelled(&self, session: &mut HarvestSession) -> Finished {
        if let Err(error) = self.machine.lock().transition(&EngineEvent::Cancel) {
            warn!(error = %error, "Unexpected engine state on cancel");
        }
        let message = HarvestError::Cancelled(format!(
            "harvest stopped after {} of {} steps",
            session.completed_count(),
            session.execution_steps.len()
        ))
        .to_string();
        log_session_operation("execute", &session.session_id, "cancelled", Some(&message));
        self.events.publish(HarvestEvent::ExecutionCancelled {
            session_id: session.session_id.clone(),
        });

        self.snapshot.lock().last_error = Some(message.clone());
        (ExecutionOutcome::Cancelled, Report::Error(message))
    }

    /// Invoke the matching callback; a panic inside it never reaches the caller
    fn deliver(&self, report: Report, session: &HarvestSession) {
        let (name, invoked) = match report {
            Report::Success => {
                let callback = self.on_success.read().clone();
                let Some(callback) = callback else { return };
                ("on_success", catch_unwind(AssertUnwindSafe(|| callback(session))))
            }
            Report::Error(message) => {
                let callback = self.on_error.read().clone();
                let Some(callback) = callback else { return };
                ("on_error", catch_unwind(AssertUnwindSafe(|| callback(&message, session))))
            }
        };
        if let Err(panic) = invoked {
            warn!(
                callback = name,
                session_id = %session.session_id,
                panic = %panic_message(&*panic),
                "Engine callback panicked"
            );
        }
    }
}

fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
