//! Finite state machine for the player lifecycle

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PlayerError, PlayerResult};

/// Externally visible playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Buffering,
    Ended,
    Error,
}

/// What triggered a transition; carried in `statechange` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StateAction {
    Load,
    Loaded,
    Play,
    Pause,
    Stall,
    Resume,
    End,
    Error,
    Retry,
    Reset,
}

/// One observed state change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub from: PlayerState,
    pub to: PlayerState,
    pub action: Option<StateAction>,
    /// True when the change bypassed table validation.
    pub forced: bool,
}

/// The transition table. `reset()` (forcing `Idle`) is additionally legal
/// from every state and is handled outside this table.
fn is_legal(from: PlayerState, to: PlayerState) -> bool {
    use PlayerState::*;
    matches!(
        (from, to),
        (Idle, Loading)
            | (Loading, Ready)
            | (Loading, Error)
            | (Loading, Idle)
            | (Ready, Playing)
            | (Ready, Error)
            | (Ready, Idle)
            | (Playing, Paused)
            | (Playing, Buffering)
            | (Playing, Ended)
            | (Playing, Error)
            | (Playing, Idle)
            | (Paused, Playing)
            | (Paused, Buffering)
            | (Paused, Error)
            | (Paused, Idle)
            | (Buffering, Playing)
            | (Buffering, Paused)
            | (Buffering, Error)
            | (Buffering, Idle)
            | (Ended, Playing)
            | (Ended, Loading)
            | (Ended, Idle)
            | (Error, Loading)
            | (Error, Idle)
    )
}

/// Owner of the state value. Nothing else in the crate mutates
/// [`PlayerState`].
#[derive(Debug)]
pub struct PlayerStateMachine {
    state: PlayerState,
}

impl Default for PlayerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerStateMachine {
    pub fn new() -> Self {
        Self {
            state: PlayerState::Idle,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Whether `transition_to(to)` would be accepted.
    pub fn can_transition_to(&self, to: PlayerState) -> bool {
        self.state == to || is_legal(self.state, to)
    }

    /// Validated transition. A same-state request is a no-op (`Ok(None)`);
    /// an illegal one is a programmer error and comes back fatal.
    pub fn transition_to(
        &mut self,
        to: PlayerState,
        action: Option<StateAction>,
    ) -> PlayerResult<Option<Transition>> {
        if self.state == to {
            return Ok(None);
        }
        if !is_legal(self.state, to) {
            return Err(PlayerError::state(format!(
                "illegal transition {} -> {to}",
                self.state
            )));
        }
        let transition = Transition {
            from: self.state,
            to,
            action,
            forced: false,
        };
        debug!(
            target = "player.state",
            from = %transition.from,
            to = %transition.to,
            "transition"
        );
        self.state = to;
        Ok(Some(transition))
    }

    /// Unvalidated transition, reserved for error recovery. Forcing the
    /// current state is still a no-op so observers never see `from == to`.
    pub fn force_transition(
        &mut self,
        to: PlayerState,
        action: Option<StateAction>,
    ) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        if !is_legal(self.state, to) {
            warn!(
                target = "player.state",
                from = %self.state,
                to = %to,
                "forced transition outside the table"
            );
        }
        let transition = Transition {
            from: self.state,
            to,
            action,
            forced: true,
        };
        self.state = to;
        Some(transition)
    }

    /// Always-legal forced return to `Idle`.
    pub fn reset(&mut self) -> Option<Transition> {
        self.force_transition(PlayerState::Idle, Some(StateAction::Reset))
    }

    /// States from which `play()` may start playback.
    pub fn is_playable(&self) -> bool {
        matches!(
            self.state,
            PlayerState::Ready | PlayerState::Paused | PlayerState::Ended
        )
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }
}
