//! Error recovery controller
//!
//! Receives classified errors, consults the retry policy table, and
//! answers with a recovery action for the session coordinator to
//! execute. Attempt counts are tracked per `(category, code)` pair so an
//! unrelated error cannot burn another error's retry budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{ErrorCategory, ErrorCode, PlayerError};
use crate::events::{EventBus, PlayerEvent};
use crate::retry::{RetryPolicySet, RetryState, compute_delay};

/// What the session coordinator should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryAction {
    /// Nothing to do; fatal errors end up here.
    None,
    /// The adapter is expected to re-request the failed resource.
    Retry,
    /// Give up on the failed segment and continue past it.
    SkipSegment,
    /// Force a quality drop to relieve the decoder.
    QualityFallback,
    /// Tear the source down and re-run `load` after the delay.
    ReinitSource,
}

/// Action plus the backoff delay to wait before executing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryPlan {
    pub action: RecoveryAction,
    pub delay: Duration,
}

impl RecoveryPlan {
    fn none() -> Self {
        Self {
            action: RecoveryAction::None,
            delay: Duration::ZERO,
        }
    }
}

/// Per-session recovery state. Publishes `error`/`fatal`/`recovery`/
/// `recovered` onto the bus as it decides.
pub struct ErrorController {
    policies: RetryPolicySet,
    states: HashMap<(ErrorCategory, ErrorCode), RetryState>,
    bus: Arc<EventBus>,
}

impl ErrorController {
    pub fn new(policies: RetryPolicySet, bus: Arc<EventBus>) -> Self {
        Self {
            policies,
            states: HashMap::new(),
            bus,
        }
    }

    /// Decide what to do about `error`. The attempt is recorded and the
    /// matching events are published before this returns.
    pub fn handle(&mut self, error: &PlayerError) -> RecoveryPlan {
        self.bus.emit(&PlayerEvent::Error {
            error: error.clone(),
        });

        if error.is_fatal() {
            warn!(
                target = "player.recovery",
                code = %error.code,
                "fatal error; no recovery"
            );
            self.bus.emit(&PlayerEvent::Fatal {
                error: error.clone(),
            });
            return RecoveryPlan::none();
        }

        let policy = self.policies.policy_for(error.category).clone();
        let state = self
            .states
            .entry((error.category, error.code))
            .or_default();

        if !state.can_retry(&policy) {
            warn!(
                target = "player.recovery",
                code = %error.code,
                attempts = state.attempt,
                "retry budget exhausted"
            );
            self.bus.emit(&PlayerEvent::Fatal {
                error: error.clone(),
            });
            return RecoveryPlan::none();
        }

        let delay = compute_delay(state.attempt, &policy);
        state.record(error.code);
        let attempt = state.attempt;

        let action = match error.category {
            ErrorCategory::NetworkTransient => RecoveryAction::Retry,
            // first corruption gets a retry; persistent corruption is skipped
            ErrorCategory::SegmentCorruption if attempt <= 1 => RecoveryAction::Retry,
            ErrorCategory::SegmentCorruption => RecoveryAction::SkipSegment,
            ErrorCategory::DecodeFailure => RecoveryAction::QualityFallback,
            ErrorCategory::MediaSourceFailure => RecoveryAction::ReinitSource,
            ErrorCategory::KeySystem => RecoveryAction::ReinitSource,
            ErrorCategory::FatalIncompatibility | ErrorCategory::Unknown => RecoveryAction::Retry,
        };

        debug!(
            target = "player.recovery",
            code = %error.code,
            action = %action,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "recovery plan"
        );

        self.bus.emit(&PlayerEvent::Recovery {
            error: error.clone(),
            attempt,
            max_attempts: policy.max_attempts,
        });

        RecoveryPlan { action, delay }
    }

    /// A recovery attempt worked; clear the pair's budget.
    pub fn mark_recovered(&mut self, error: &PlayerError) {
        if let Some(state) = self.states.get_mut(&(error.category, error.code)) {
            state.reset();
        }
        self.bus.emit(&PlayerEvent::Recovered {
            category: error.category,
            code: error.code,
        });
    }

    /// Forget all retry budgets (source change).
    pub fn clear_retry_states(&mut self) {
        self.states.clear();
    }
}
