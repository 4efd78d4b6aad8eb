//! Player lifecycle state machine
//!
//! The only authority for externally visible playback state. All state
//! changes pass through [`PlayerStateMachine::transition_to`] (validated
//! against the transition table) or [`PlayerStateMachine::force_transition`]
//! (reserved for error recovery and reset).

pub mod state_machine;

pub use state_machine::{PlayerState, PlayerStateMachine, StateAction, Transition};
