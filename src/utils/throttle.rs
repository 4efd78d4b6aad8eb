//! Coalescing rate limiter
//!
//! Caps an update stream to one delivery per period while guaranteeing
//! that the latest value is eventually delivered: intermediate values are
//! collapsed into a single trailing slot flushed by a timer once the
//! period elapses. This is a coalescing throttle, not a dropping one.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

type Emit<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Slot<T> {
    last_emit: Option<Instant>,
    pending: Option<T>,
    timer_armed: bool,
}

/// Single-slot throttle with trailing-edge flush.
pub struct CoalescingThrottle<T> {
    period: Duration,
    emit: Emit<T>,
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T: Send + 'static> CoalescingThrottle<T> {
    /// `emit` runs either on the offering task (leading edge) or on a
    /// spawned timer task (trailing edge). Requires a tokio runtime.
    pub fn new<F>(period: Duration, emit: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            period,
            emit: Arc::new(emit),
            slot: Arc::new(Mutex::new(Slot {
                last_emit: None,
                pending: None,
                timer_armed: false,
            })),
        }
    }

    /// Offer a value. Delivered immediately when the period has elapsed,
    /// otherwise it replaces the pending slot and a trailing flush is
    /// scheduled.
    pub fn offer(&self, value: T) {
        let now = Instant::now();
        let flush_at = {
            let mut slot = self.slot.lock().expect("throttle lock poisoned");
            match slot.last_emit {
                Some(last) if now.duration_since(last) < self.period => {
                    slot.pending = Some(value);
                    if slot.timer_armed {
                        return;
                    }
                    slot.timer_armed = true;
                    last + self.period
                }
                _ => {
                    slot.last_emit = Some(now);
                    drop(slot);
                    (self.emit)(value);
                    return;
                }
            }
        };

        let slot = self.slot.clone();
        let emit = self.emit.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(flush_at).await;
            let value = {
                let mut slot = slot.lock().expect("throttle lock poisoned");
                slot.timer_armed = false;
                match slot.pending.take() {
                    Some(v) => {
                        slot.last_emit = Some(Instant::now());
                        v
                    }
                    None => return,
                }
            };
            emit(value);
        });
    }

    /// Deliver any pending value right now (used on teardown).
    pub fn flush_now(&self) {
        let value = {
            let mut slot = self.slot.lock().expect("throttle lock poisoned");
            match slot.pending.take() {
                Some(v) => {
                    slot.last_emit = Some(Instant::now());
                    v
                }
                None => return,
            }
        };
        (self.emit)(value);
    }
}
