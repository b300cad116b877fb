use super::{
    errors::{StateMachineError, StateMachineResult},
    events::EngineEvent,
    states::EngineState,
};
use tracing::debug;

/// Orchestration lifecycle: `idle → executing → {completed | failed}`,
/// with `failed → executing` only through an explicit retry
#[derive(Debug, Default)]
pub struct EngineStateMachine {
    state: EngineState,
}

impl EngineStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> EngineState {
        self.state
    }

    /// Apply `event`, returning the new state
    pub fn transition(&mut self, event: &EngineEvent) -> StateMachineResult<EngineState> {
        let target = Self::determine_target_state(self.state, event)?;
        debug!(from = %self.state, to = %target, event = event.event_type(), "Engine transition");
        self.state = target;
        Ok(target)
    }

    fn determine_target_state(
        current: EngineState,
        event: &EngineEvent,
    ) -> StateMachineResult<EngineState> {
        let target = match (current, event) {
            // Start transitions; a completed engine may run the next session
            (EngineState::Idle, EngineEvent::Start)
            | (EngineState::Completed, EngineEvent::Start)
            | (EngineState::Failed, EngineEvent::Start) => EngineState::Executing,

            (EngineState::Failed, EngineEvent::Retry) => EngineState::Executing,

            (EngineState::Executing, EngineEvent::Complete) => EngineState::Completed,
            (EngineState::Executing, EngineEvent::Fail(_)) => EngineState::Failed,
            (EngineState::Executing, EngineEvent::Cancel) => EngineState::Idle,

            (EngineState::Executing, EngineEvent::Start | EngineEvent::Retry) => {
                return Err(StateMachineError::GuardFailed {
                    reason: "an execution is already in flight".to_string(),
                })
            }

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
