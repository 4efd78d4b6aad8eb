//! Adaptive bitrate controller
//!
//! Feeds segment download timings into a pair of EWMAs, keeps a bounded
//! sample history, and picks the quality level the estimated bandwidth
//! can sustain, under hysteresis rules that stop the selection from
//! oscillating: upgrades need buffer headroom, a meaningful bitrate step
//! and a cool-down; downgrades are rate-limited except for the panic
//! paths (starving buffer, excessive dropped frames).

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{AbrConfig, StartLevel, defaults};
use crate::errors::{PlayerError, PlayerResult};
use crate::models::{BandwidthSample, PlatformClass, QualityLevel, SegmentTiming};

pub mod ewma;

pub use ewma::Ewma;

/// Who is choosing the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbrMode {
    Auto,
    Manual,
}

/// Why a switch happened; carried for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SwitchReason {
    Warmup,
    PanicDrop,
    Upgrade,
    Downgrade,
    ForcedDrop,
    Manual,
}

/// One decided level change. The session coordinator applies it to the
/// adapter and publishes `qualitychange`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSwitch {
    pub from: usize,
    pub to: usize,
    pub auto: bool,
    pub reason: SwitchReason,
}

/// Externally visible ABR state, served in `abrupdate` events.
#[derive(Debug, Clone, Serialize)]
pub struct AbrSnapshot {
    pub auto: bool,
    pub current_level: Option<QualityLevel>,
    pub estimated_bandwidth: Option<f64>,
    pub switching: bool,
}

/// Resolved tuning for one session.
#[derive(Debug, Clone)]
struct AbrSettings {
    start_level: StartLevel,
    safety_factor: f64,
    upgrade_threshold: f64,
    downgrade_threshold: f64,
    mobile_bias: bool,
}

impl AbrSettings {
    fn resolve(config: &AbrConfig, platform: PlatformClass) -> Self {
        Self {
            start_level: config.start_level,
            safety_factor: config.safety_factor(platform),
            upgrade_threshold: config.upgrade_threshold(platform),
            downgrade_threshold: config.downgrade_threshold(),
            mobile_bias: platform == PlatformClass::Mobile && config.mobile_stability_bias,
        }
    }
}

/// Dropped-frame delta tracker, sampled at 1 Hz against a cumulative
/// counter pushed by the host.
#[derive(Debug, Clone, Default)]
struct DroppedFrameTracker {
    last_total: Option<u64>,
    last_sample_at: Option<Instant>,
}

impl DroppedFrameTracker {
    /// Returns the dropped-frames-per-second rate when a full sampling
    /// interval has elapsed, re-baselining on counter resets.
    fn observe(&mut self, total: u64, now: Instant) -> Option<f64> {
        let interval = Duration::from_millis(defaults::DROPPED_FRAME_SAMPLE_INTERVAL_MS);
        match (self.last_total, self.last_sample_at) {
            (Some(last_total), Some(last_at)) => {
                let elapsed = now.duration_since(last_at);
                if elapsed < interval {
                    return None;
                }
                self.last_sample_at = Some(now);
                if total < last_total {
                    // counter reset upstream
                    self.last_total = Some(total);
                    return None;
                }
                let delta = total - last_total;
                self.last_total = Some(total);
                Some(delta as f64 / elapsed.as_secs_f64())
            }
            _ => {
                self.last_total = Some(total);
                self.last_sample_at = Some(now);
                None
            }
        }
    }
}

/// Owner of the level set and current index for the active session.
pub struct AbrController {
    settings: AbrSettings,
    levels: Vec<QualityLevel>,
    mode: AbrMode,
    current: usize,
    samples: VecDeque<BandwidthSample>,
    fast: Ewma,
    slow: Ewma,
    segments_loaded: u64,
    forward_buffer: f64,
    last_upgrade_at: Option<Instant>,
    last_downgrade_at: Option<Instant>,
    dropped: DroppedFrameTracker,
    switching: bool,
}

impl AbrController {
    pub fn new(config: &AbrConfig, platform: PlatformClass) -> Self {
        Self {
            settings: AbrSettings::resolve(config, platform),
            levels: Vec::new(),
            mode: AbrMode::Auto,
            current: 0,
            samples: VecDeque::with_capacity(defaults::BANDWIDTH_SAMPLE_HISTORY),
            fast: Ewma::new(defaults::EWMA_FAST_ALPHA),
            slow: Ewma::new(defaults::EWMA_SLOW_ALPHA),
            segments_loaded: 0,
            forward_buffer: 0.0,
            last_upgrade_at: None,
            last_downgrade_at: None,
            dropped: DroppedFrameTracker::default(),
            switching: false,
        }
    }

    /// Install the session's level set, sorted ascending by bitrate, and
    /// pick the configured start level.
    pub fn set_levels(&mut self, mut levels: Vec<QualityLevel>) {
        levels.sort_by_key(|l| l.bitrate);
        for (i, level) in levels.iter_mut().enumerate() {
            level.index = i;
        }
        self.current = self.settings.start_level.resolve(levels.len());
        self.levels = levels;
        info!(
            target = "player.abr",
            levels = self.levels.len(),
            start = self.current,
            "level set installed"
        );
    }

    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    pub fn current_level(&self) -> Option<&QualityLevel> {
        self.levels.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_auto(&self) -> bool {
        matches!(self.mode, AbrMode::Auto)
    }

    /// Conservative bandwidth estimate: the lesser of the two EWMAs.
    pub fn estimated_bandwidth(&self) -> Option<f64> {
        match (self.fast.value(), self.slow.value()) {
            (Some(f), Some(s)) => Some(f.min(s)),
            _ => None,
        }
    }

    /// Fold in one segment download timing. Timings with a non-positive
    /// duration are discarded.
    pub fn record_segment(&mut self, timing: SegmentTiming) {
        let Some(bandwidth) = timing.bandwidth_bps() else {
            debug!(
                target = "player.abr",
                bytes = timing.bytes,
                "discarding segment timing with non-positive duration"
            );
            return;
        };
        if self.samples.len() == defaults::BANDWIDTH_SAMPLE_HISTORY {
            self.samples.pop_front();
        }
        self.samples.push_back(BandwidthSample {
            bandwidth_bps: bandwidth,
            timestamp: chrono::Utc::now(),
        });
        self.fast.observe(bandwidth);
        self.slow.observe(bandwidth);
        self.segments_loaded += 1;
        self.switching = false;
    }

    /// Forward buffer depth, pushed in after every buffer update.
    pub fn update_forward_buffer(&mut self, forward_buffer: f64) {
        self.forward_buffer = forward_buffer;
    }

    /// Run the selection algorithm. Returns a switch to apply, if any.
    pub fn select_level(&mut self, now: Instant) -> Option<LevelSwitch> {
        if !self.is_auto() || self.levels.len() < 2 {
            return None;
        }

        // Warm-up: hold the lowest level until enough samples exist.
        if self.segments_loaded < defaults::ABR_WARMUP_SEGMENTS {
            return self.apply_switch(0, SwitchReason::Warmup, now);
        }

        // Panic drop: a starving buffer outranks every other signal.
        if self.forward_buffer < self.settings.downgrade_threshold {
            return self.apply_switch(0, SwitchReason::PanicDrop, now);
        }

        let estimate = self.estimated_bandwidth()?;
        let target_bitrate = estimate * self.settings.safety_factor;
        let target = self
            .levels
            .iter()
            .rposition(|l| l.bitrate as f64 <= target_bitrate)
            .unwrap_or(0);

        if target > self.current {
            if self.forward_buffer < self.settings.upgrade_threshold {
                return None;
            }
            let ratio =
                self.levels[target].bitrate as f64 / self.levels[self.current].bitrate as f64;
            if ratio < defaults::UPGRADE_MIN_BITRATE_RATIO {
                return None;
            }
            if let Some(last) = self.last_upgrade_at {
                if now.duration_since(last)
                    < Duration::from_millis(defaults::UPGRADE_INTERVAL_MS)
                {
                    return None;
                }
            }
            let to = if self.settings.mobile_bias {
                (self.current + 1).min(target)
            } else {
                target
            };
            return self.apply_switch(to, SwitchReason::Upgrade, now);
        }

        if target < self.current {
            if let Some(last) = self.last_downgrade_at {
                if now.duration_since(last)
                    < Duration::from_millis(defaults::DOWNGRADE_INTERVAL_MS)
                {
                    return None;
                }
            }
            let to = if self.settings.mobile_bias {
                target
            } else {
                self.current - 1
            };
            return self.apply_switch(to, SwitchReason::Downgrade, now);
        }

        None
    }

    /// Host-pushed cumulative dropped-frame counter. A sustained rate
    /// above the limit forces a two-level drop, bypassing the downgrade
    /// cool-down.
    pub fn record_dropped_frames(&mut self, total: u64, now: Instant) -> Option<LevelSwitch> {
        let rate = self.dropped.observe(total, now)?;
        if rate <= defaults::DROPPED_FRAME_RATE_LIMIT {
            return None;
        }
        debug!(
            target = "player.abr",
            rate,
            from = self.current,
            "dropped-frame rate over limit"
        );
        self.force_drop(now)
    }

    /// Immediate two-level drop, bypassing the downgrade cool-down. Used
    /// for the dropped-frame path and the decode-failure quality
    /// fallback.
    pub fn force_drop(&mut self, now: Instant) -> Option<LevelSwitch> {
        if !self.is_auto() || self.levels.is_empty() {
            return None;
        }
        let to = self.current.saturating_sub(defaults::FORCED_DROP_LEVELS);
        self.apply_switch(to, SwitchReason::ForcedDrop, now)
    }

    /// Pin a level and leave auto mode.
    pub fn set_manual(&mut self, index: usize) -> PlayerResult<Option<LevelSwitch>> {
        if index >= self.levels.len() {
            return Err(PlayerError::state(format!(
                "quality index {index} out of range ({} levels)",
                self.levels.len()
            )));
        }
        self.mode = AbrMode::Manual;
        if index == self.current {
            return Ok(None);
        }
        let switch = LevelSwitch {
            from: self.current,
            to: index,
            auto: false,
            reason: SwitchReason::Manual,
        };
        self.current = index;
        self.switching = true;
        Ok(Some(switch))
    }

    /// Re-enter auto mode and immediately re-run selection.
    pub fn set_auto(&mut self, now: Instant) -> Option<LevelSwitch> {
        self.mode = AbrMode::Auto;
        self.select_level(now)
    }

    pub fn snapshot(&self) -> AbrSnapshot {
        AbrSnapshot {
            auto: self.is_auto(),
            current_level: self.current_level().cloned(),
            estimated_bandwidth: self.estimated_bandwidth(),
            switching: self.switching,
        }
    }

    /// Forget everything session-scoped (source change).
    pub fn reset(&mut self) {
        self.levels.clear();
        self.mode = AbrMode::Auto;
        self.current = 0;
        self.samples.clear();
        self.fast.reset();
        self.slow.reset();
        self.segments_loaded = 0;
        self.forward_buffer = 0.0;
        self.last_upgrade_at = None;
        self.last_downgrade_at = None;
        self.dropped = DroppedFrameTracker::default();
        self.switching = false;
    }

    fn apply_switch(
        &mut self,
        to: usize,
        reason: SwitchReason,
        now: Instant,
    ) -> Option<LevelSwitch> {
        if to == self.current {
            return None;
        }
        let switch = LevelSwitch {
            from: self.current,
            to,
            auto: true,
            reason,
        };
        if to > self.current {
            self.last_upgrade_at = Some(now);
        } else {
            self.last_downgrade_at = Some(now);
        }
        info!(
            target = "player.abr",
            from = switch.from,
            to = switch.to,
            reason = %reason,
            "quality switch"
        );
        self.current = to;
        self.switching = true;
        Some(switch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> Vec<QualityLevel> {
        vec![
            QualityLevel {
                index: 0,
                bitrate: 500_000,
                width: 426,
                height: 240,
                codec: None,
                frame_rate: None,
                label: "240p".into(),
            },
            QualityLevel {
                index: 1,
                bitrate: 2_000_000,
                width: 1280,
                height: 720,
                codec: None,
                frame_rate: None,
                label: "720p".into(),
            },
        ]
    }

    fn controller() -> AbrController {
        let mut abr = AbrController::new(&AbrConfig::default(), PlatformClass::Desktop);
        abr.set_levels(levels());
        abr
    }

    fn four_mbps() -> SegmentTiming {
        SegmentTiming {
            bytes: 250_000,
            duration_ms: 500,
            segment_duration: 2.0,
        }
    }

    #[test]
    fn warmup_holds_lowest_level() {
        let mut abr = controller();
        let now = Instant::now();
        abr.update_forward_buffer(15.0);
        abr.record_segment(four_mbps());
        abr.record_segment(four_mbps());
        assert!(abr.select_level(now).is_none(), "still warming up");
        assert_eq!(abr.current_index(), 0);
    }

    #[test]
    fn upgrade_rate_limit_blocks_then_allows() {
        let mut abr = controller();
        let now = Instant::now();
        abr.update_forward_buffer(15.0);
        for _ in 0..3 {
            abr.record_segment(four_mbps());
        }
        assert_eq!(abr.estimated_bandwidth(), Some(4_000_000.0));

        // upgraded one second ago: rate-limited
        abr.last_upgrade_at = Some(now - Duration::from_millis(1000));
        assert!(abr.select_level(now).is_none());

        // eleven seconds ago: allowed
        abr.last_upgrade_at = Some(now - Duration::from_millis(11_000));
        let switch = abr.select_level(now).expect("upgrade should pass");
        assert_eq!(switch.to, 1);
        assert!(switch.auto);
        assert_eq!(switch.reason, SwitchReason::Upgrade);
        assert_eq!(abr.current_index(), 1);
    }

    #[test]
    fn upgrade_requires_buffer_headroom() {
        let mut abr = controller();
        let now = Instant::now();
        for _ in 0..3 {
            abr.record_segment(four_mbps());
        }
        abr.update_forward_buffer(6.0); // above panic, below upgrade threshold
        assert!(abr.select_level(now).is_none());
    }

    #[test]
    fn upgrade_requires_meaningful_bitrate_step() {
        let mut abr = AbrController::new(&AbrConfig::default(), PlatformClass::Desktop);
        let mut lv = levels();
        lv[1].bitrate = 600_000; // ratio 1.2 < 1.3
        abr.set_levels(lv);
        abr.update_forward_buffer(15.0);
        for _ in 0..3 {
            abr.record_segment(four_mbps());
        }
        assert!(abr.select_level(Instant::now()).is_none());
    }

    #[test]
    fn starving_buffer_panic_drops_to_lowest() {
        let mut abr = controller();
        let now = Instant::now();
        abr.update_forward_buffer(15.0);
        for _ in 0..3 {
            abr.record_segment(four_mbps());
        }
        abr.last_upgrade_at = Some(now - Duration::from_millis(11_000));
        abr.select_level(now).expect("upgrade first");
        assert_eq!(abr.current_index(), 1);

        abr.update_forward_buffer(3.0);
        let switch = abr.select_level(now).expect("panic drop");
        assert_eq!(switch.to, 0);
        assert_eq!(switch.reason, SwitchReason::PanicDrop);
    }

    #[test]
    fn downgrade_is_rate_limited() {
        let mut abr = controller();
        let now = Instant::now();
        abr.current = 1;
        abr.segments_loaded = 5;
        abr.update_forward_buffer(20.0);
        // estimate of 1 Mbps: target is level 0
        abr.fast.observe(1_000_000.0);
        abr.slow.observe(1_000_000.0);

        abr.last_downgrade_at = Some(now - Duration::from_millis(1000));
        assert!(abr.select_level(now).is_none(), "inside 5 s floor");

        abr.last_downgrade_at = Some(now - Duration::from_millis(6000));
        let switch = abr.select_level(now).expect("downgrade allowed");
        assert_eq!(switch.to, 0);
        assert_eq!(switch.reason, SwitchReason::Downgrade);
    }

    #[test]
    fn desktop_downgrades_one_step_at_a_time() {
        let mut abr = AbrController::new(&AbrConfig::default(), PlatformClass::Desktop);
        let mut lv = levels();
        lv.push(QualityLevel {
            index: 2,
            bitrate: 6_000_000,
            width: 1920,
            height: 1080,
            codec: None,
            frame_rate: None,
            label: "1080p".into(),
        });
        abr.set_levels(lv);
        abr.current = 2;
        abr.segments_loaded = 5;
        abr.update_forward_buffer(20.0);
        abr.fast.observe(800_000.0);
        abr.slow.observe(800_000.0);

        let switch = abr.select_level(Instant::now()).expect("downgrade");
        assert_eq!(switch.to, 1, "one step, not straight to 0");
    }

    #[test]
    fn mobile_bias_drops_straight_to_target_and_climbs_slowly() {
        let config = AbrConfig {
            mobile_stability_bias: true,
            ..Default::default()
        };
        let mut abr = AbrController::new(&config, PlatformClass::Mobile);
        let mut lv = levels();
        lv.push(QualityLevel {
            index: 2,
            bitrate: 6_000_000,
            width: 1920,
            height: 1080,
            codec: None,
            frame_rate: None,
            label: "1080p".into(),
        });
        abr.set_levels(lv);
        abr.segments_loaded = 5;
        abr.update_forward_buffer(30.0);

        // 20 Mbps estimate targets the top level, but bias climbs one step
        abr.fast.observe(20_000_000.0);
        abr.slow.observe(20_000_000.0);
        let up = abr.select_level(Instant::now()).expect("upgrade");
        assert_eq!(up.to, 1);

        // collapse to 500 kbps: bias drops straight to 0
        abr.current = 2;
        abr.last_downgrade_at = None;
        abr.fast.reset();
        abr.slow.reset();
        abr.fast.observe(500_000.0);
        abr.slow.observe(500_000.0);
        let down = abr.select_level(Instant::now()).expect("downgrade");
        assert_eq!(down.to, 0);
    }

    #[test]
    fn forced_drop_on_dropped_frames_bypasses_cooldown() {
        let mut abr = controller();
        let t0 = Instant::now();
        abr.current = 1;
        abr.last_downgrade_at = Some(t0); // cool-down would normally block

        assert!(abr.record_dropped_frames(0, t0).is_none(), "baseline");
        let t1 = t0 + Duration::from_millis(1000);
        let switch = abr
            .record_dropped_frames(15, t1)
            .expect("15 drops/s forces a drop");
        assert_eq!(switch.reason, SwitchReason::ForcedDrop);
        assert_eq!(switch.to, 0, "two levels clamped to zero");
    }

    #[test]
    fn dropped_frame_counter_reset_rebaselines() {
        let mut abr = controller();
        let t0 = Instant::now();
        abr.current = 1;
        abr.record_dropped_frames(100, t0);
        let t1 = t0 + Duration::from_millis(1500);
        assert!(abr.record_dropped_frames(5, t1).is_none());
        let t2 = t1 + Duration::from_millis(1000);
        assert!(abr.record_dropped_frames(6, t2).is_none(), "1/s is fine");
    }

    #[test]
    fn manual_mode_pins_and_auto_resumes() {
        let mut abr = controller();
        let now = Instant::now();
        let switch = abr.set_manual(1).unwrap().expect("switch to 1");
        assert!(!switch.auto);
        assert_eq!(abr.current_index(), 1);
        assert!(!abr.is_auto());

        // selection is inert in manual mode
        abr.update_forward_buffer(0.0);
        assert!(abr.select_level(now).is_none());

        assert!(abr.set_manual(9).is_err(), "out of range");

        // auto re-entry re-runs selection (warm-up pulls back to 0)
        let back = abr.set_auto(now).expect("warm-up pulls to level 0");
        assert_eq!(back.to, 0);
        assert!(abr.is_auto());
    }

    #[test]
    fn estimate_is_min_of_fast_and_slow() {
        let mut abr = controller();
        abr.record_segment(SegmentTiming {
            bytes: 125_000,
            duration_ms: 1000,
            segment_duration: 2.0,
        }); // 1 Mbps
        abr.record_segment(SegmentTiming {
            bytes: 625_000,
            duration_ms: 1000,
            segment_duration: 2.0,
        }); // 5 Mbps
        // fast = 3 Mbps, slow = 1.4 Mbps
        assert_eq!(abr.estimated_bandwidth(), Some(1_400_000.0));
    }

    #[test]
    fn sample_history_is_bounded() {
        let mut abr = controller();
        for _ in 0..25 {
            abr.record_segment(four_mbps());
        }
        assert_eq!(abr.samples.len(), defaults::BANDWIDTH_SAMPLE_HISTORY);
        assert_eq!(abr.segments_loaded, 25);
    }

    #[test]
    fn levels_are_sorted_and_reindexed() {
        let mut abr = AbrController::new(&AbrConfig::default(), PlatformClass::Desktop);
        let mut lv = levels();
        lv.reverse();
        abr.set_levels(lv);
        assert_eq!(abr.levels()[0].bitrate, 500_000);
        assert_eq!(abr.levels()[0].index, 0);
        assert_eq!(abr.levels()[1].index, 1);
    }
}
