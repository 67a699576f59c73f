use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::mapper::{interpolate_audio_time, interpolate_tick_position};

/// Anchor linking a playback time to a notation tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    #[serde(alias = "audioTime")]
    pub audio_time: f64,
    #[serde(alias = "tabTick")]
    pub tab_tick: f64,
}

impl SyncPoint {
    pub fn new(audio_time: f64, tab_tick: f64) -> Self {
        Self {
            audio_time,
            tab_tick,
        }
    }
}

/// Snapshot of the anchors for one backing track.
///
/// The store never edits the points it was given; each query sorts its own
/// copy. Callers replace the whole store when the persisted list changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncPointStore {
    points: Vec<SyncPoint>,
}

impl SyncPointStore {
    pub fn new(points: Vec<SyncPoint>) -> Self {
        Self { points }
    }

    /// Builds a store after checking that every anchor is usable and that
    /// ticks never decrease as audio time increases.
    pub fn validated(points: Vec<SyncPoint>) -> Result<Self, SyncError> {
        for (index, point) in points.iter().enumerate() {
            if !point.audio_time.is_finite() || !point.tab_tick.is_finite() {
                return Err(SyncError::NonFinite { index });
            }
            if point.audio_time < 0.0 {
                return Err(SyncError::NegativeAudioTime {
                    index,
                    audio_time: point.audio_time,
                });
            }
        }
        let store = Self::new(points);
        for pair in store.sorted_by_audio_time().windows(2) {
            if pair[1].tab_tick < pair[0].tab_tick {
                return Err(SyncError::NonMonotonic {
                    audio_time: pair[1].audio_time,
                    previous: pair[0].tab_tick,
                    current: pair[1].tab_tick,
                });
            }
        }
        Ok(store)
    }

    pub fn points(&self) -> &[SyncPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn sorted_by_audio_time(&self) -> Vec<SyncPoint> {
        let mut sorted = self.points.clone();
        sorted.sort_by(|a, b| a.audio_time.total_cmp(&b.audio_time));
        sorted
    }

    pub fn sorted_by_tick(&self) -> Vec<SyncPoint> {
        let mut sorted = self.points.clone();
        sorted.sort_by(|a, b| a.tab_tick.total_cmp(&b.tab_tick));
        sorted
    }

    /// Highest tick any anchor references.
    pub fn last_tick(&self) -> Option<f64> {
        self.points.iter().map(|p| p.tab_tick).reduce(f64::max)
    }

    pub fn tick_at(&self, audio_time: f64) -> Option<f64> {
        interpolate_tick_position(audio_time, &self.points)
    }

    pub fn audio_time_at(&self, tick: f64) -> Option<f64> {
        interpolate_audio_time(tick, &self.points)
    }
}
