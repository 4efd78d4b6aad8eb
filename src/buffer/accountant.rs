//! Buffer health tracking and signalling

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{BufferInfo, compute_eviction, normalize_ranges};
use crate::config::{BufferLimits, defaults};
use crate::events::{EventBus, PlayerEvent};
use crate::models::BufferedRange;
use crate::utils::CoalescingThrottle;

/// Owns the last known `(current_time, ranges)` pair and publishes
/// buffer health onto the event bus.
///
/// `bufferupdate` is coalesced to one emission per 250 ms with the
/// trailing value always delivered; `bufferlow`/`buffersufficient` are
/// edge-triggered immediately.
pub struct BufferAccountant {
    limits: BufferLimits,
    hidden: bool,
    low: bool,
    current_time: f64,
    ranges: Vec<BufferedRange>,
    bus: Arc<EventBus>,
    update_throttle: CoalescingThrottle<BufferInfo>,
}

impl BufferAccountant {
    /// Requires a tokio runtime (the throttle schedules trailing flushes).
    pub fn new(limits: BufferLimits, bus: Arc<EventBus>) -> Self {
        let throttle_bus = bus.clone();
        let update_throttle = CoalescingThrottle::new(
            Duration::from_millis(defaults::BUFFER_UPDATE_THROTTLE_MS),
            move |info: BufferInfo| {
                throttle_bus.emit(&PlayerEvent::BufferUpdate(info));
            },
        );
        Self {
            limits,
            hidden: false,
            low: false,
            current_time: 0.0,
            ranges: Vec::new(),
            bus,
            update_throttle,
        }
    }

    /// Limits after the visibility clamp, if any.
    pub fn effective_limits(&self) -> BufferLimits {
        if self.hidden {
            self.limits.clamped_for_hidden()
        } else {
            self.limits
        }
    }

    /// Ingest a `(current_time, ranges)` delta from the sink and publish
    /// the derived health signals. Returns the derived snapshot so the
    /// caller can feed the forward depth into the ABR controller.
    pub fn update(&mut self, current_time: f64, ranges: Vec<BufferedRange>) -> BufferInfo {
        self.current_time = current_time;
        self.ranges = normalize_ranges(ranges);

        let limits = self.effective_limits();
        let info = BufferInfo::derive(current_time, self.ranges.clone(), &limits);
        self.update_throttle.offer(info.clone());

        if info.forward_buffer < limits.min_buffer {
            if !self.low {
                self.low = true;
                debug!(
                    target = "player.buffer",
                    forward = info.forward_buffer,
                    min = limits.min_buffer,
                    "buffer low"
                );
                self.bus.emit(&PlayerEvent::BufferLow {
                    forward_buffer: info.forward_buffer,
                });
            }
        } else if self.low && info.forward_buffer >= limits.target_buffer {
            self.low = false;
            debug!(
                target = "player.buffer",
                forward = info.forward_buffer,
                target = limits.target_buffer,
                "buffer recovered"
            );
            self.bus.emit(&PlayerEvent::BufferSufficient);
        }

        info
    }

    /// Host visibility hint; hidden sessions hold less media.
    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn is_low(&self) -> bool {
        self.low
    }

    /// Current derived snapshot without ingesting new data.
    pub fn info(&self) -> BufferInfo {
        BufferInfo::derive(
            self.current_time,
            self.ranges.clone(),
            &self.effective_limits(),
        )
    }

    /// Advisory eviction pass: publishes one `bufferevicted` per range
    /// and returns the list. The caller decides whether to actually
    /// enqueue removes against the append surface.
    pub fn publish_eviction(&self) -> Vec<BufferedRange> {
        let evictions = compute_eviction(self.current_time, &self.ranges, &self.effective_limits());
        for range in &evictions {
            self.bus.emit(&PlayerEvent::BufferEvicted {
                start: range.start,
                end: range.end,
            });
        }
        evictions
    }

    /// Flush any throttled update and forget the range set (source change).
    pub fn reset(&mut self) {
        self.update_throttle.flush_now();
        self.current_time = 0.0;
        self.ranges.clear();
        self.low = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::events::PlayerEventKind;

    fn limits() -> BufferLimits {
        BufferLimits {
            max_buffer: 40.0,
            target_buffer: 30.0,
            min_buffer: 10.0,
            back_buffer: 30.0,
        }
    }

    fn ranges_ahead(t: f64, depth: f64) -> Vec<BufferedRange> {
        vec![BufferedRange::new(0.0, t + depth)]
    }

    #[tokio::test(start_paused = true)]
    async fn low_signal_fires_once_until_recovered() {
        let bus = Arc::new(EventBus::new());
        let lows = Arc::new(AtomicUsize::new(0));
        let suff = Arc::new(AtomicUsize::new(0));
        {
            let lows = lows.clone();
            bus.subscribe(PlayerEventKind::BufferLow, move |_| {
                lows.fetch_add(1, Ordering::SeqCst);
            });
            let suff = suff.clone();
            bus.subscribe(PlayerEventKind::BufferSufficient, move |_| {
                suff.fetch_add(1, Ordering::SeqCst);
            });
        }
        let mut acc = BufferAccountant::new(limits(), bus);

        acc.update(10.0, ranges_ahead(10.0, 5.0));
        acc.update(11.0, ranges_ahead(11.0, 4.0));
        assert_eq!(lows.load(Ordering::SeqCst), 1, "low is edge-triggered");
        assert!(acc.is_low());

        // back above min but below target: still considered low
        acc.update(12.0, ranges_ahead(12.0, 15.0));
        assert_eq!(suff.load(Ordering::SeqCst), 0);
        assert!(acc.is_low());

        acc.update(13.0, ranges_ahead(13.0, 31.0));
        assert_eq!(suff.load(Ordering::SeqCst), 1);
        assert!(!acc.is_low());
    }

    #[tokio::test(start_paused = true)]
    async fn updates_are_throttled_and_coalesced() {
        let bus = Arc::new(EventBus::new());
        let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            bus.subscribe(PlayerEventKind::BufferUpdate, move |e| {
                if let PlayerEvent::BufferUpdate(info) = e {
                    seen.lock().unwrap().push(info.current_time);
                }
            });
        }
        let mut acc = BufferAccountant::new(limits(), bus);

        // 4 updates inside one throttle window
        for i in 0..4 {
            acc.update(10.0 + i as f64 * 0.05, ranges_ahead(10.0, 30.0));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2, "leading + trailing only, got {seen:?}");
        assert_eq!(seen[0], 10.0);
        assert_eq!(*seen.last().unwrap(), 10.15, "trailing carries last value");
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_clamps_effective_limits() {
        let bus = Arc::new(EventBus::new());
        let mut acc = BufferAccountant::new(limits(), bus);
        acc.set_hidden(true);
        let effective = acc.effective_limits();
        assert_eq!(effective.max_buffer, 10.0);
        assert_eq!(effective.target_buffer, 8.0);

        // a 12 s forward buffer clears both min and the clamped target
        let info = acc.update(0.0, ranges_ahead(0.0, 12.0));
        assert!(!acc.is_low());
        assert_eq!(info.max_buffer, 10.0);

        acc.set_hidden(false);
        assert_eq!(acc.effective_limits().max_buffer, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_is_advisory_and_published() {
        let bus = Arc::new(EventBus::new());
        let evicted = Arc::new(AtomicUsize::new(0));
        {
            let evicted = evicted.clone();
            bus.subscribe(PlayerEventKind::BufferEvicted, move |_| {
                evicted.fetch_add(1, Ordering::SeqCst);
            });
        }
        let mut acc = BufferAccountant::new(limits(), bus);
        acc.update(100.0, vec![BufferedRange::new(0.0, 130.0)]);
        let ranges = acc.publish_eviction();
        assert_eq!(ranges, vec![BufferedRange::new(0.0, 70.0)]);
        assert_eq!(evicted.load(Ordering::SeqCst), 1);
    }
}
