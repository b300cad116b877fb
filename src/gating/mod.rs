//! Action gating
//!
//! Prerequisite evaluation (wallet, approvals, balance, geo, time window,
//! custom checks) producing an enabled/disabled decision with a reason.

pub mod action_gate;
pub mod prerequisites;

pub use action_gate::{evaluate, ActionGate};
pub use prerequisites::{
    ActionConfig, ActionEvaluation, BalanceRequirement, CustomCheck, GateState, Prerequisite,
    PrerequisiteKind, TimeWindow,
};
