//! Engine configuration
//!
//! A `PlayerConfig` is handed to the engine at construction. Every field
//! has a serde default so hosts can supply partial TOML files; anything
//! unspecified falls back to the per-platform table in [`defaults`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::ErrorCategory;
use crate::models::PlatformClass;

pub mod defaults;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub platform: PlatformClass,
    pub buffer: BufferConfig,
    pub abr: AbrConfig,
    /// Per-category overrides of the built-in retry policy table.
    pub retry: HashMap<ErrorCategory, RetryOverride>,
    pub playback: PlaybackConfig,
}

/// Buffer length overrides in seconds. `None` means "use the platform
/// default" from the table in [`defaults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub max_buffer_length: Option<f64>,
    pub target_buffer_length: Option<f64>,
    pub min_buffer_length: Option<f64>,
    pub back_buffer_length: Option<f64>,
}

/// Resolved buffer limits after platform defaults and overrides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferLimits {
    pub max_buffer: f64,
    pub target_buffer: f64,
    pub min_buffer: f64,
    pub back_buffer: f64,
}

impl BufferConfig {
    /// Apply platform defaults, then explicit overrides.
    pub fn resolve(&self, platform: PlatformClass) -> BufferLimits {
        let (max, target, min, back) = match platform {
            PlatformClass::Mobile => (
                defaults::MOBILE_MAX_BUFFER,
                defaults::MOBILE_TARGET_BUFFER,
                defaults::MOBILE_MIN_BUFFER,
                defaults::MOBILE_BACK_BUFFER,
            ),
            PlatformClass::Desktop => (
                defaults::DESKTOP_MAX_BUFFER,
                defaults::DESKTOP_TARGET_BUFFER,
                defaults::DESKTOP_MIN_BUFFER,
                defaults::DESKTOP_BACK_BUFFER,
            ),
        };
        BufferLimits {
            max_buffer: self.max_buffer_length.unwrap_or(max),
            target_buffer: self.target_buffer_length.unwrap_or(target),
            min_buffer: self.min_buffer_length.unwrap_or(min),
            back_buffer: self.back_buffer_length.unwrap_or(back),
        }
    }
}

impl BufferLimits {
    /// Effective limits while the session is hidden: max and target are
    /// clamped down so a backgrounded player stops hoarding media.
    pub fn clamped_for_hidden(self) -> Self {
        Self {
            max_buffer: self.max_buffer.min(defaults::HIDDEN_MAX_BUFFER),
            target_buffer: self.target_buffer.min(defaults::HIDDEN_TARGET_BUFFER),
            ..self
        }
    }
}

/// ABR tuning knobs. `None` fields resolve per platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbrConfig {
    pub start_level: StartLevel,
    /// Fraction of the bandwidth estimate considered spendable, in (0, 1].
    pub bandwidth_safety_factor: Option<f64>,
    /// Forward buffer (s) required before an upgrade is considered.
    pub upgrade_buffer_threshold: Option<f64>,
    /// Forward buffer (s) below which quality drops to the lowest level.
    pub downgrade_buffer_threshold: Option<f64>,
    /// On mobile: upgrade one step at a time, downgrade straight to target.
    pub mobile_stability_bias: bool,
}

impl AbrConfig {
    pub fn safety_factor(&self, platform: PlatformClass) -> f64 {
        self.bandwidth_safety_factor.unwrap_or(match platform {
            PlatformClass::Mobile => defaults::MOBILE_BANDWIDTH_SAFETY_FACTOR,
            PlatformClass::Desktop => defaults::DESKTOP_BANDWIDTH_SAFETY_FACTOR,
        })
    }

    pub fn upgrade_threshold(&self, platform: PlatformClass) -> f64 {
        self.upgrade_buffer_threshold.unwrap_or(match platform {
            PlatformClass::Mobile => defaults::MOBILE_UPGRADE_BUFFER_THRESHOLD,
            PlatformClass::Desktop => defaults::DESKTOP_UPGRADE_BUFFER_THRESHOLD,
        })
    }

    pub fn downgrade_threshold(&self) -> f64 {
        self.downgrade_buffer_threshold
            .unwrap_or(defaults::DOWNGRADE_BUFFER_THRESHOLD)
    }
}

/// Initial quality selection before any bandwidth samples exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartLevel {
    Preset(StartLevelPreset),
    /// Pin the start level to an explicit index into the level set.
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartLevelPreset {
    Lowest,
    Highest,
    /// A quarter of the way up the ladder.
    Auto,
}

impl Default for StartLevel {
    fn default() -> Self {
        StartLevel::Preset(StartLevelPreset::Lowest)
    }
}

impl StartLevel {
    /// Resolve against a level set of size `level_count` (levels sorted by
    /// ascending bitrate). Out-of-range indices clamp to the top level.
    pub fn resolve(&self, level_count: usize) -> usize {
        if level_count == 0 {
            return 0;
        }
        match self {
            StartLevel::Preset(StartLevelPreset::Lowest) => 0,
            StartLevel::Preset(StartLevelPreset::Highest) => level_count - 1,
            StartLevel::Preset(StartLevelPreset::Auto) => level_count / 4,
            StartLevel::Index(i) => (*i).min(level_count - 1),
        }
    }
}

/// Per-category retry policy overrides; `None` keeps the table value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOverride {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub exponential: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub autoplay: bool,
    pub muted: bool,
    pub volume: f64,
    #[serde(rename = "loop")]
    pub loop_playback: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autoplay: false,
            muted: false,
            volume: defaults::DEFAULT_VOLUME,
            loop_playback: false,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// anything the file does not set.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}
