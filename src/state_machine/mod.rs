// State machines for harvest execution
//
// Steps move pending → in-progress → completed | failed and return to pending
// only through a reset. The engine moves idle → executing → completed | failed,
// re-entering executing from failed only via retry.

pub mod engine_state_machine;
pub mod errors;
pub mod events;
pub mod states;
pub mod step_state_machine;

pub use engine_state_machine::EngineStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{EngineEvent, StepEvent};
pub use states::{EngineState, SessionStatus, StepStatus};
pub use step_state_machine::StepStateMachine;
