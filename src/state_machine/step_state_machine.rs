use super::{
    errors::{StateMachineError, StateMachineResult},
    events::StepEvent,
    states::StepStatus,
};

/// Pure transition table for an execution step's status
pub struct StepStateMachine;

impl StepStateMachine {
    /// Determine the target status for `event`, rejecting transitions the
    /// progression invariant forbids (e.g. completing a step that never started)
    pub fn determine_target_state(
        current: StepStatus,
        event: &StepEvent,
    ) -> StateMachineResult<StepStatus> {
        let target = match (current, event) {
            (StepStatus::Pending, StepEvent::Start) => StepStatus::InProgress,
            (StepStatus::InProgress, StepEvent::Complete) => StepStatus::Completed,
            (StepStatus::InProgress, StepEvent::Fail(_)) => StepStatus::Failed,

            // Retry resets the failed step and its pending suffix; cancellation
            // returns the in-flight step to pending
            (StepStatus::Failed, StepEvent::Reset)
            | (StepStatus::Pending, StepEvent::Reset)
            | (StepStatus::InProgress, StepEvent::Reset) => StepStatus::Pending,

            (from, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let current = StepStateMachine::determine_target_state(StepStatus::Pending, &StepEvent::Start)
            .unwrap();
        assert_eq!(current, StepStatus::InProgress);
        let done = StepStateMachine::determine_target_state(current, &StepEvent::Complete).unwrap();
        assert_eq!(done, StepStatus::Completed);
    }

    #[test]
    fn test_failed_step_only_leaves_via_reset() {
        let failed = StepStatus::Failed;
        assert!(StepStateMachine::determine_target_state(failed, &StepEvent::Complete).is_err());
        assert!(StepStateMachine::determine_target_state(failed, &StepEvent::Start).is_err());
        assert_eq!(
            StepStateMachine::determine_target_state(failed, &StepEvent::Reset).unwrap(),
            StepStatus::Pending
        );
    }

    #[test]
    fn test_completed_is_terminal() {
        let error =
            StepStateMachine::determine_target_state(StepStatus::Completed, &StepEvent::Reset)
                .unwrap_err();
        assert!(matches!(error, StateMachineError::InvalidTransition { .. }));
    }
}
