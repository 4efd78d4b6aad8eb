//! Retry policy engine
//!
//! Pure delay/attempt bookkeeping for error recovery, with exponential
//! backoff and jitter. Policies are fixed per error category (with
//! configuration overrides); the engine never sleeps here: callers
//! receive a computed [`Duration`] and schedule it themselves.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{RetryOverride, defaults};
use crate::errors::{ErrorCategory, ErrorCode};

/// Retry behaviour for one error category.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of recovery attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Ceiling applied before jitter.
    pub max_delay_ms: u64,
    /// Whether the delay doubles with each attempt.
    pub exponential: bool,
    /// Jitter fraction in [0, 1]; the delay is stretched by up to this much.
    pub jitter_factor: f64,
}

impl RetryPolicy {
    /// Built-in policy table.
    pub fn for_category(category: ErrorCategory) -> Self {
        let (max_attempts, base_delay_ms, max_delay_ms, exponential) = match category {
            ErrorCategory::NetworkTransient => (5, 1000, 16_000, true),
            ErrorCategory::SegmentCorruption => (2, 0, 0, false),
            ErrorCategory::DecodeFailure => (1, 0, 0, false),
            ErrorCategory::MediaSourceFailure => (2, 1000, 2000, false),
            ErrorCategory::FatalIncompatibility => (0, 0, 0, false),
            ErrorCategory::KeySystem => (1, 1000, 1000, false),
            ErrorCategory::Unknown => (2, 1000, 4000, true),
        };
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            exponential,
            jitter_factor: defaults::RETRY_JITTER_FACTOR,
        }
    }

    fn apply_override(&mut self, o: &RetryOverride) {
        if let Some(v) = o.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = o.base_delay_ms {
            self.base_delay_ms = v;
        }
        if let Some(v) = o.max_delay_ms {
            self.max_delay_ms = v;
        }
        if let Some(v) = o.exponential {
            self.exponential = v;
        }
    }
}

/// Compute the delay before retry number `attempt` (0-based).
///
/// `delay = clamp(base × (exponential ? 2^attempt : 1), 0, max) × (1 + rand·jitter)`
pub fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let factor = if policy.exponential {
        2u64.saturating_pow(attempt)
    } else {
        1
    };
    let raw = policy
        .base_delay_ms
        .saturating_mul(factor)
        .min(policy.max_delay_ms);
    Duration::from_millis(stretch_with_jitter(raw, policy.jitter_factor))
}

/// Stretch a delay by a random fraction of `jitter_factor`, so retrying
/// clients spread out instead of herding.
fn stretch_with_jitter(delay_ms: u64, jitter_factor: f64) -> u64 {
    if delay_ms == 0 || jitter_factor <= 0.0 {
        return delay_ms;
    }
    let jitter = delay_ms as f64 * jitter_factor.min(1.0) * fastrand::f64();
    delay_ms + jitter as u64
}

/// Mutable attempt counter for one `(category, code)` pair.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<ErrorCode>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl RetryState {
    /// Whether another attempt is allowed under `policy`.
    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        self.attempt < policy.max_attempts
    }

    /// Record one attempt against `cause`.
    pub fn record(&mut self, cause: ErrorCode) {
        self.attempt += 1;
        self.last_error = Some(cause);
        self.last_attempt_at = Some(Utc::now());
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_error = None;
        self.last_attempt_at = None;
    }
}

/// The full per-category policy table after configuration overrides.
#[derive(Debug, Clone)]
pub struct RetryPolicySet {
    policies: HashMap<ErrorCategory, RetryPolicy>,
}

impl RetryPolicySet {
    pub fn new(overrides: &HashMap<ErrorCategory, RetryOverride>) -> Self {
        let categories = [
            ErrorCategory::NetworkTransient,
            ErrorCategory::SegmentCorruption,
            ErrorCategory::DecodeFailure,
            ErrorCategory::MediaSourceFailure,
            ErrorCategory::FatalIncompatibility,
            ErrorCategory::KeySystem,
            ErrorCategory::Unknown,
        ];
        let mut policies = HashMap::with_capacity(categories.len());
        for category in categories {
            let mut policy = RetryPolicy::for_category(category);
            if let Some(o) = overrides.get(&category) {
                policy.apply_override(o);
            }
            policies.insert(category, policy);
        }
        Self { policies }
    }

    pub fn policy_for(&self, category: ErrorCategory) -> &RetryPolicy {
        // every category is inserted in new()
        &self.policies[&category]
    }
}

impl Default for RetryPolicySet {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}
