use harvest_engine::loading::sanitize_progress;
use harvest_engine::models::{ExecutionStep, HarvestSession};
use harvest_engine::resilience::{classify_error_severity, ErrorSeverity, RetryPolicy, TtlCache};
use harvest_engine::state_machine::{SessionStatus, StepStatus};
use proptest::prelude::*;
use std::time::Duration;

/// Session of `len` on-chain steps where the first `completed` have finished
/// and, when `failed`, the next one failed
fn session_with_progress(len: usize, completed: usize, failed: bool) -> HarvestSession {
    let steps = (1..=len)
        .map(|number| ExecutionStep::on_chain(format!("step-{number}"), number as u32, "Step"))
        .collect();
    let mut session = HarvestSession::new(steps);
    for step in session.execution_steps.iter_mut().take(completed) {
        step.start().unwrap();
        step.complete(Some("0x01".to_string()), Duration::from_millis(10)).unwrap();
    }
    if failed {
        if let Some(step) = session.execution_steps.get_mut(completed) {
            step.start().unwrap();
            step.fail("reverted", Duration::from_millis(10)).unwrap();
        }
    }
    session.recompute_status();
    session
}

proptest! {
    /// Property: progress always lands in [0, 100]
    #[test]
    fn progress_is_always_clamped(value in prop::num::f64::ANY) {
        let progress = sanitize_progress(value);
        prop_assert!((0.0..=100.0).contains(&progress));
        if value.is_finite() && (0.0..=100.0).contains(&value) {
            prop_assert_eq!(progress, value);
        }
    }

    /// Property: backoff never exceeds the cap and never shrinks between attempts
    #[test]
    fn backoff_is_capped_and_monotonic(
        base_ms in 1u64..5_000,
        cap_ms in 5_000u64..60_000,
        attempt in 0u32..40,
    ) {
        let policy = RetryPolicy::default()
            .with_retry_delay(Duration::from_millis(base_ms))
            .with_max_retry_delay(Duration::from_millis(cap_ms));
        let current = policy.delay_for_attempt(attempt);
        let next = policy.delay_for_attempt(attempt + 1);
        prop_assert!(current <= Duration::from_millis(cap_ms));
        prop_assert!(current <= next);
    }

    /// Property: session status is derived from its steps
    #[test]
    fn session_status_follows_steps(len in 1usize..8, completed in 0usize..8, failed in any::<bool>()) {
        let completed = completed.min(len);
        let session = session_with_progress(len, completed, failed);

        prop_assert!(session.validate().is_ok());
        let expected = if failed && completed < len {
            SessionStatus::Failed
        } else if completed == len {
            SessionStatus::Completed
        } else {
            SessionStatus::Draft
        };
        prop_assert_eq!(session.status, expected);
        prop_assert_eq!(session.completed_count(), completed);
    }

    /// Property: resetting from the failed step keeps the completed prefix
    #[test]
    fn reset_preserves_completed_prefix(len in 2usize..8, completed in 0usize..7) {
        let completed = completed.min(len - 1);
        let mut session = session_with_progress(len, completed, true);
        let prefix: Vec<_> = session.execution_steps[..completed].to_vec();

        let index = session.first_failed_index().unwrap();
        session.reset_from(index).unwrap();

        prop_assert_eq!(&session.execution_steps[..completed], &prefix[..]);
        prop_assert!(session.execution_steps[completed..]
            .iter()
            .all(|step| step.status == StepStatus::Pending));
    }

    /// Property: the cache never holds more than its capacity
    #[test]
    fn cache_respects_capacity(capacity in 1usize..20, keys in prop::collection::vec("[a-z]{1,4}", 0..60)) {
        let cache = TtlCache::new(capacity, 0.8);
        for key in &keys {
            cache.insert(key, key.len(), Duration::from_secs(60));
        }
        prop_assert!(cache.len() <= capacity);
        if let Some(last) = keys.last() {
            prop_assert!(cache.keys().contains(last));
        }
    }

    /// Property: server status codes without transport wording classify as at least high severity
    #[test]
    fn server_status_is_high_severity(status in 500u16..600, detail in "[a-z ]{0,20}") {
        let transport = [
            "network", "timeout", "timed out", "offline", "unreachable", "connection", "failed to fetch",
        ];
        prop_assume!(!transport.iter().any(|pattern| detail.contains(pattern)));
        let message = format!("request failed with status {status}: {detail}");
        let severity = classify_error_severity(&message);
        prop_assert!(severity >= ErrorSeverity::High);
    }
}
