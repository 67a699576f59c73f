use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Mic RMS to volume-percent gain used by the adjust branch.
pub const SCALE_FACTOR: f32 = 2200.0;
/// Lowest candidate volume the adjust branch produces.
pub const TARGET_FLOOR: f32 = 10.0;
/// Highest candidate volume the adjust branch produces.
pub const TARGET_CEILING: f32 = 80.0;
/// Volume the decay branch settles toward once input stops.
pub const BASELINE_VOLUME: f32 = 40.0;
/// Share of the previous volume kept on each decay tick.
pub const DECAY_RETENTION: f32 = 0.95;

/// Tuning for the volume-matching loop. Every field is optional in a
/// serialized document and falls back to its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeMatcherConfig {
    /// Retention applied when blending the previous volume with a new target.
    pub smoothing_factor: f32,
    pub update_interval_ms: u64,
    pub min_volume: f32,
    pub max_volume: f32,
    /// Smoothed mic RMS above which the player counts as active.
    pub mic_threshold: f32,
    /// Smallest per-tick change, in percent, that reaches the callback.
    pub min_change_percent: f32,
    /// Retention of the mic level filter.
    pub mic_smoothing: f32,
}

impl Default for VolumeMatcherConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: 0.3,
            update_interval_ms: 200,
            min_volume: 10.0,
            max_volume: 100.0,
            mic_threshold: 0.05,
            min_change_percent: 2.0,
            mic_smoothing: 0.85,
        }
    }
}

impl VolumeMatcherConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_retention("smoothing_factor", self.smoothing_factor)?;
        check_retention("mic_smoothing", self.mic_smoothing)?;
        if self.update_interval_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "update_interval_ms",
                range: "> 0",
                value: 0.0,
            });
        }
        check_percent("min_volume", self.min_volume)?;
        check_percent("max_volume", self.max_volume)?;
        if self.min_volume > self.max_volume {
            return Err(ConfigError::InvertedVolumeBounds {
                min: self.min_volume,
                max: self.max_volume,
            });
        }
        check_non_negative("mic_threshold", self.mic_threshold)?;
        check_non_negative("min_change_percent", self.min_change_percent)?;
        Ok(())
    }
}

fn check_retention(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            range: "[0, 1)",
            value: value as f64,
        })
    }
}

fn check_percent(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            range: "[0, 100]",
            value: value as f64,
        })
    }
}

fn check_non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            range: ">= 0",
            value: value as f64,
        })
    }
}
