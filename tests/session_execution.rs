//! End-to-end harvest session scenarios against the simulated executor.

mod common;

use common::{deterministic_config, three_step_session, EngineHarness};
use harvest_engine::events::HarvestEvent;
use harvest_engine::execution::ExecutionConfig;
use harvest_engine::orchestration::{ActionEngineConfig, ExecutionOutcome, RejectionReason};
use harvest_engine::state_machine::{EngineState, SessionStatus, StepStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_all_steps_complete_and_success_fires_once() {
    let mut harness = EngineHarness::new(deterministic_config());
    let mut session = three_step_session();

    let outcome = harness.engine.execute_session(&mut session).await;

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session
        .execution_steps
        .iter()
        .all(|step| step.status == StepStatus::Completed));
    assert!(session.execution_steps[0].transaction_hash.is_some());
    assert!(session.execution_steps[2].transaction_hash.is_none());
    assert_eq!(session.execution_steps[1].duration_ms, Some(100));
    assert_eq!(harness.success_count(), 1);
    assert!(harness.error_reasons().is_empty());
    assert_eq!(harness.engine.state(), EngineState::Completed);
    assert!(!harness.engine.is_executing());

    let events = harness.drain_events();
    assert!(matches!(
        events.first(),
        Some(HarvestEvent::SessionStarted { total_steps: 3, .. })
    ));
    assert!(matches!(events.last(), Some(HarvestEvent::SessionCompleted { .. })));
    let step_updates = events
        .iter()
        .filter(|event| matches!(event, HarvestEvent::StepUpdated { .. }))
        .count();
    assert_eq!(step_updates, 6);
}

#[tokio::test(start_paused = true)]
async fn test_failed_step_halts_and_retry_resumes_from_it() {
    let failing = ActionEngineConfig {
        execution: deterministic_config().execution.with_forced_failure("swap"),
        retry_failure_probability: None,
    };
    let harness = EngineHarness::new(failing);
    let mut session = three_step_session();

    let outcome = harness.engine.execute_session(&mut session).await;

    match outcome {
        ExecutionOutcome::Failed { failed_step_id, .. } => {
            assert_eq!(failed_step_id.as_deref(), Some("swap"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.execution_steps[0].status, StepStatus::Completed);
    assert_eq!(session.execution_steps[1].status, StepStatus::Failed);
    assert!(session.execution_steps[1].error_message.is_some());
    assert_eq!(session.execution_steps[2].status, StepStatus::Pending);
    assert_eq!(harness.engine.state(), EngineState::Failed);
    assert_eq!(harness.success_count(), 0);

    let reasons = harness.error_reasons();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("swap"));

    let first_hash = session.execution_steps[0].transaction_hash.clone();
    harness.engine.set_execution_config(deterministic_config());

    let outcome = harness.engine.retry_execution(&mut session).await;

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.execution_steps[0].transaction_hash, first_hash);
    assert!(session.execution_steps[1].error_message.is_none());
    assert_eq!(harness.success_count(), 1);
    assert_eq!(harness.error_reasons().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_certain_failure_fails_first_step() {
    let config = ActionEngineConfig {
        execution: ExecutionConfig::deterministic().with_failure_probability(1.0),
        retry_failure_probability: None,
    };
    let harness = EngineHarness::new(config);
    let mut session = three_step_session();

    let outcome = harness.engine.execute_session(&mut session).await;

    assert!(!outcome.is_completed());
    assert_eq!(session.first_failed_index(), Some(0));
    assert_eq!(session.completed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_execution_rejected_while_running() {
    let harness = EngineHarness::new(deterministic_config());
    let engine = Arc::clone(&harness.engine);

    let running = tokio::spawn(async move {
        let mut session = three_step_session();
        engine.execute_session(&mut session).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.engine.is_executing());

    let mut other = three_step_session().with_session_id("session-other");
    let outcome = harness.engine.execute_session(&mut other).await;
    assert_eq!(
        outcome,
        ExecutionOutcome::Rejected(RejectionReason::AlreadyExecuting)
    );
    assert!(other.is_fresh());

    assert_eq!(running.await.unwrap(), ExecutionOutcome::Completed);
    assert!(!harness.engine.is_executing());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_session_resumes_from_unfinished_step() {
    let harness = EngineHarness::new(deterministic_config());
    let engine = Arc::clone(&harness.engine);

    let running = tokio::spawn(async move {
        let mut session = three_step_session();
        let outcome = engine.execute_session(&mut session).await;
        (outcome, session)
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(harness.engine.cancel());

    let (outcome, mut session) = running.await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Cancelled);
    assert_eq!(session.execution_steps[0].status, StepStatus::Completed);
    assert_eq!(session.execution_steps[1].status, StepStatus::Pending);
    assert_eq!(harness.engine.state(), EngineState::Idle);
    assert_eq!(harness.error_reasons().len(), 1);
    assert!(!harness.engine.cancel());

    let outcome = harness.engine.retry_execution(&mut session).await;
    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(harness.success_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_context_tracks_run_and_is_hidden() {
    let harness = EngineHarness::new(deterministic_config());
    let progress = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let _subscription = {
        let progress = Arc::clone(&progress);
        harness.loading.subscribe(move |snapshot| {
            if let Some(value) = snapshot
                .get("harvest-execution:session-test")
                .and_then(|state| state.progress)
            {
                progress.lock().push(value);
            }
        })
    };

    let mut session = three_step_session();
    harness.engine.execute_session(&mut session).await;

    let seen = progress.lock().clone();
    assert_eq!(seen.first().copied(), Some(0.0));
    assert_eq!(seen.last().copied(), Some(100.0));
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(!harness.loading.is_loading("harvest-execution:session-test"));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_reflects_finished_run() {
    let harness = EngineHarness::new(deterministic_config());
    let mut session = three_step_session();
    harness.engine.execute_session(&mut session).await;

    let snapshot = harness.engine.snapshot();
    assert_eq!(snapshot.state, EngineState::Completed);
    assert!(!snapshot.is_executing);
    assert_eq!(snapshot.current_step_index, None);
    assert_eq!(snapshot.steps, session.execution_steps);
    assert_eq!(snapshot.logs.len(), 6);
    assert!(snapshot.last_error.is_none());
}

/// At most one step in progress, with only completed steps before it and only
/// pending steps after it
fn assert_single_frontier(statuses: &[StepStatus]) {
    let in_progress: Vec<usize> = statuses
        .iter()
        .enumerate()
        .filter(|(_, status)| **status == StepStatus::InProgress)
        .map(|(index, _)| index)
        .collect();
    assert!(in_progress.len() <= 1, "several steps in progress: {statuses:?}");
    if let Some(&current) = in_progress.first() {
        assert!(
            statuses[..current].iter().all(|status| *status == StepStatus::Completed),
            "unfinished step before the current one: {statuses:?}"
        );
        assert!(
            statuses[current + 1..].iter().all(|status| *status == StepStatus::Pending),
            "started step after the current one: {statuses:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_never_more_than_one_step_in_progress() {
    let mut harness = EngineHarness::new(deterministic_config());
    let engine = Arc::clone(&harness.engine);

    let running = tokio::spawn(async move {
        let mut session = three_step_session();
        let outcome = engine.execute_session(&mut session).await;
        (outcome, session)
    });

    let mut samples = Vec::new();
    while !running.is_finished() {
        tokio::time::sleep(Duration::from_millis(20)).await;
        samples.push(harness.engine.snapshot());
    }
    let (outcome, session) = running.await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Completed);

    let mut saw_current = false;
    for snapshot in samples.iter().filter(|snapshot| snapshot.is_executing) {
        let statuses: Vec<StepStatus> = snapshot.steps.iter().map(|step| step.status).collect();
        assert_single_frontier(&statuses);
        if let Some(current) = snapshot.current_step_index {
            saw_current = true;
            assert_eq!(statuses[current], StepStatus::InProgress);
        }
    }
    assert!(saw_current);

    // Replay every step update in publication order
    let mut statuses = vec![StepStatus::Pending; session.execution_steps.len()];
    let mut updates = 0;
    for event in harness.drain_events() {
        if let HarvestEvent::StepUpdated {
            step_index, status, ..
        } = event
        {
            statuses[step_index] = status;
            assert_single_frontier(&statuses);
            updates += 1;
        }
    }
    assert_eq!(updates, 6);
    assert!(statuses.iter().all(|status| *status == StepStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_success_callback_does_not_escape() {
    let harness = EngineHarness::new(deterministic_config());
    harness.engine.on_success(|_| panic!("dashboard refresh failed"));
    let mut session = three_step_session();

    let outcome = harness.engine.execute_session(&mut session).await;

    assert_eq!(outcome, ExecutionOutcome::Completed);
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(!harness.engine.is_executing());
    assert_eq!(harness.loading.active_count(), 0);
    let snapshot = harness.engine.snapshot();
    assert!(!snapshot.is_executing);
    assert_eq!(snapshot.state, EngineState::Completed);
    assert!(!harness.engine.cancel());

    let mut next = three_step_session().with_session_id("session-next");
    assert_eq!(
        harness.engine.execute_session(&mut next).await,
        ExecutionOutcome::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_error_callback_leaves_session_retryable() {
    let failing = ActionEngineConfig {
        execution: deterministic_config().execution.with_forced_failure("approve"),
        retry_failure_probability: None,
    };
    let harness = EngineHarness::new(failing);
    harness.engine.on_error(|_, _| panic!("toast renderer crashed"));
    let mut session = three_step_session();

    let outcome = harness.engine.execute_session(&mut session).await;

    assert!(matches!(outcome, ExecutionOutcome::Failed { .. }));
    assert!(!harness.engine.is_executing());
    assert_eq!(harness.loading.active_count(), 0);
    assert_eq!(harness.engine.state(), EngineState::Failed);

    harness.engine.set_execution_config(deterministic_config());
    assert_eq!(
        harness.engine.retry_execution(&mut session).await,
        ExecutionOutcome::Completed
    );
    assert_eq!(harness.success_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_observe_finished_snapshot() {
    let failing = ActionEngineConfig {
        execution: deterministic_config().execution.with_forced_failure("sell"),
        retry_failure_probability: None,
    };
    let harness = EngineHarness::new(failing);
    let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    for success in [true, false] {
        let engine = Arc::downgrade(&harness.engine);
        let observed = Arc::clone(&observed);
        let calls = Arc::clone(&calls);
        let record = move || {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(engine) = engine.upgrade() {
                let snapshot = engine.snapshot();
                observed.lock().push((
                    snapshot.state,
                    snapshot.is_executing,
                    engine.is_executing(),
                    snapshot.current_step_index,
                ));
            }
        };
        if success {
            harness.engine.on_success(move |_| record());
        } else {
            harness.engine.on_error(move |_, _| record());
        }
    }

    let mut session = three_step_session();
    harness.engine.execute_session(&mut session).await;
    harness.engine.set_execution_config(deterministic_config());
    harness.engine.retry_execution(&mut session).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        *observed.lock(),
        vec![
            (EngineState::Failed, false, false, None),
            (EngineState::Completed, false, false, None),
        ]
    );
}
