//! Typed event bus
//!
//! Every externally visible occurrence in the engine is a variant of the
//! closed [`PlayerEvent`] union. Subscriptions are keyed by the derived
//! [`PlayerEventKind`] discriminant, so hosts subscribe to exactly the
//! variants they care about without stringly-typed event names.
//!
//! Delivery is synchronous and in subscription order over a snapshot of
//! the subscriber list, which makes emitting from inside a handler safe.
//! A panicking handler is caught and logged; remaining handlers still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use strum::EnumDiscriminants;
use tracing::{debug, error};
use uuid::Uuid;

use crate::abr::AbrSnapshot;
use crate::buffer::BufferInfo;
use crate::errors::{ErrorCategory, ErrorCode, PlayerError};
use crate::models::{QualityLevel, SubtitleTrack};
use crate::player::{PlayerState, StateAction};

/// The closed union of everything the engine can announce.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(PlayerEventKind), derive(Hash, strum::Display, strum::EnumIter))]
pub enum PlayerEvent {
    StateChange {
        from: PlayerState,
        to: PlayerState,
        action: Option<StateAction>,
    },
    TimeUpdate {
        current_time: f64,
    },
    DurationChange {
        duration: f64,
    },
    BufferUpdate(BufferInfo),
    BufferLow {
        forward_buffer: f64,
    },
    BufferSufficient,
    /// Advisory: the accountant recommends removing this range.
    BufferEvicted {
        start: f64,
        end: f64,
    },
    QualityLevels {
        levels: Vec<QualityLevel>,
    },
    QualityChange {
        level: QualityLevel,
        auto: bool,
    },
    AbrUpdate(AbrSnapshot),
    RateChange {
        rate: f64,
    },
    VolumeChange {
        volume: f64,
        muted: bool,
    },
    Seeking {
        target: f64,
    },
    Seeked {
        position: f64,
    },
    Waiting,
    CanPlay,
    Ended,
    Loaded {
        url: String,
    },
    Error {
        error: PlayerError,
    },
    Fatal {
        error: PlayerError,
    },
    Recovery {
        error: PlayerError,
        attempt: u32,
        max_attempts: u32,
    },
    Recovered {
        category: ErrorCategory,
        code: ErrorCode,
    },
    Destroyed,
    SubtitleTracks {
        tracks: Vec<SubtitleTrack>,
    },
    SubtitleTrackChange {
        track_id: Option<String>,
    },
}

type Handler = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

#[derive(Clone)]
struct Entry {
    id: Uuid,
    once: bool,
    handler: Handler,
}

/// Handle identifying one subscription; pass back to
/// [`EventBus::unsubscribe`] to detach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    kind: PlayerEventKind,
    id: Uuid,
}

/// Kind-keyed synchronous pub/sub.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<PlayerEventKind, Vec<Entry>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event kind. Handlers run on the
    /// emitting task, in subscription order.
    pub fn subscribe<F>(&self, kind: PlayerEventKind, handler: F) -> Subscription
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.add(kind, false, Arc::new(handler))
    }

    /// Subscribe a handler that is detached after its first delivery.
    pub fn subscribe_once<F>(&self, kind: PlayerEventKind, handler: F) -> Subscription
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.add(kind, true, Arc::new(handler))
    }

    fn add(&self, kind: PlayerEventKind, once: bool, handler: Handler) -> Subscription {
        let id = Uuid::new_v4();
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.entry(kind).or_default().push(Entry { id, once, handler });
        Subscription { kind, id }
    }

    /// Detach one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        match subs.get_mut(&subscription.kind) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|e| e.id != subscription.id);
                before != entries.len()
            }
            None => false,
        }
    }

    /// Drop all subscriptions for one kind, or every subscription.
    pub fn remove_all(&self, kind: Option<PlayerEventKind>) {
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        match kind {
            Some(kind) => {
                subs.remove(&kind);
            }
            None => subs.clear(),
        }
    }

    /// Deliver `event` to every current subscriber of its kind.
    ///
    /// Once-subscriptions are detached before delivery so a reentrant
    /// emit cannot deliver to them twice.
    pub fn emit(&self, event: &PlayerEvent) {
        let kind = PlayerEventKind::from(event);
        let snapshot: Vec<Entry> = {
            let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
            match subs.get_mut(&kind) {
                Some(entries) => {
                    let snapshot = entries.clone();
                    entries.retain(|e| !e.once);
                    snapshot
                }
                None => Vec::new(),
            }
        };

        debug!(
            target = "player.events",
            kind = %kind,
            subscribers = snapshot.len(),
            "emit"
        );

        for entry in snapshot {
            let handler = entry.handler.clone();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    target = "player.events",
                    kind = %kind,
                    subscription = %entry.id,
                    panic = %detail,
                    "event handler panicked; continuing delivery"
                );
            }
        }
    }

    /// Number of live subscriptions for a kind.
    pub fn subscriber_count(&self, kind: PlayerEventKind) -> usize {
        let subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.get(&kind).map_or(0, Vec::len)
    }
}
