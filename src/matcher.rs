use crate::config::{
    BASELINE_VOLUME, DECAY_RETENTION, SCALE_FACTOR, TARGET_CEILING, TARGET_FLOOR,
    VolumeMatcherConfig,
};
use crate::smoothing::{Smoother, blend};

/// What a single tick decided to do with the playback volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickDecision {
    /// Input above threshold; volume followed the player.
    Adjusting,
    /// Input below threshold; volume moved toward the baseline.
    Decaying,
    /// Input below threshold and volume already at or below the baseline.
    Held,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    pub decision: TickDecision,
    pub mic_level: f32,
    pub volume: f32,
    /// Set when the change was large enough to report.
    pub emitted: Option<u8>,
}

/// Per-session volume matching state, advanced once per sampling tick.
#[derive(Clone, Debug)]
pub struct VolumeMatcher {
    config: VolumeMatcherConfig,
    mic: Smoother,
    last_volume: f32,
}

impl VolumeMatcher {
    pub fn new(config: VolumeMatcherConfig) -> Self {
        let mic = Smoother::new(config.mic_smoothing);
        let mut matcher = Self {
            config,
            mic,
            last_volume: BASELINE_VOLUME,
        };
        matcher.last_volume = matcher.bound(BASELINE_VOLUME);
        matcher
    }

    pub fn last_volume(&self) -> f32 {
        self.last_volume
    }

    pub fn mic_level(&self) -> f32 {
        self.mic.value()
    }

    /// Feeds one raw mic RMS reading and returns the resulting decision.
    pub fn tick(&mut self, raw_rms: f32) -> TickOutcome {
        let raw = if raw_rms.is_finite() {
            raw_rms.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mic_level = self.mic.push(raw);
        if mic_level > self.config.mic_threshold {
            self.adjust(mic_level)
        } else {
            self.decay(mic_level)
        }
    }

    fn adjust(&mut self, mic_level: f32) -> TickOutcome {
        let target = target_volume(mic_level);
        let smoothed = self.bound(blend(
            self.last_volume,
            target,
            self.config.smoothing_factor,
        ));
        let emitted = self.commit(smoothed);
        TickOutcome {
            decision: TickDecision::Adjusting,
            mic_level,
            volume: smoothed,
            emitted,
        }
    }

    fn decay(&mut self, mic_level: f32) -> TickOutcome {
        if self.last_volume <= BASELINE_VOLUME {
            return TickOutcome {
                decision: TickDecision::Held,
                mic_level,
                volume: self.last_volume,
                emitted: None,
            };
        }
        let decayed = self.bound(blend(self.last_volume, BASELINE_VOLUME, DECAY_RETENTION));
        let emitted = self.commit(decayed);
        TickOutcome {
            decision: TickDecision::Decaying,
            mic_level,
            volume: decayed,
            emitted,
        }
    }

    // Bounds may come from an unvalidated config, so no f32::clamp here.
    fn bound(&self, volume: f32) -> f32 {
        volume.max(self.config.min_volume).min(self.config.max_volume)
    }

    // The new volume is kept even when the change is too small to report.
    fn commit(&mut self, volume: f32) -> Option<u8> {
        let delta = (volume - self.last_volume).abs();
        self.last_volume = volume;
        (delta >= self.config.min_change_percent).then(|| to_percent(volume))
    }
}

/// Candidate playback volume for a smoothed mic level.
pub fn target_volume(mic_level: f32) -> f32 {
    (TARGET_FLOOR + mic_level * SCALE_FACTOR).min(TARGET_CEILING)
}

fn to_percent(volume: f32) -> u8 {
    volume.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(matcher: &mut VolumeMatcher, rms: f32, ticks: usize) -> Vec<TickOutcome> {
        (0..ticks).map(|_| matcher.tick(rms)).collect()
    }

    #[test]
    fn target_is_linear_then_capped() {
        assert_eq!(target_volume(0.0), 10.0);
        assert!((target_volume(0.01) - 32.0).abs() < 1e-4);
        assert_eq!(target_volume(1.0), 80.0);
    }

    #[test]
    fn quiet_input_never_adjusts() {
        let mut matcher = VolumeMatcher::new(VolumeMatcherConfig::default());
        let outcomes = run(&mut matcher, 0.01, 50);
        assert!(outcomes.iter().all(|o| o.decision == TickDecision::Held));
        assert!(outcomes.iter().all(|o| o.emitted.is_none()));
    }

    #[test]
    fn steady_input_converges_without_oscillation() {
        let config = VolumeMatcherConfig {
            mic_smoothing: 0.0,
            mic_threshold: 0.01,
            ..Default::default()
        };
        let mut matcher = VolumeMatcher::new(config);
        let outcomes = run(&mut matcher, 0.02, 60);
        let target = target_volume(0.02);

        let emitted: Vec<u8> = outcomes.iter().filter_map(|o| o.emitted).collect();
        assert_eq!(emitted, vec![50, 53]);
        let volumes: Vec<f32> = outcomes.iter().map(|o| o.volume).collect();
        assert!(volumes.windows(2).all(|w| w[0] <= w[1] + 1e-3));
        assert!(volumes.iter().all(|&v| v <= target + 1e-3));
        let last = matcher.last_volume();
        assert!((last - target).abs() < 0.01, "last={last} target={target}");
        assert!(outcomes[10..].iter().all(|o| o.emitted.is_none()));
    }

    #[test]
    fn silence_decays_toward_baseline_without_overshoot() {
        let config = VolumeMatcherConfig {
            min_change_percent: 0.5,
            ..Default::default()
        };
        let mut matcher = VolumeMatcher::new(config);
        run(&mut matcher, 0.2, 60);
        let peak = matcher.last_volume();
        assert!((peak - TARGET_CEILING).abs() < 0.01, "peak={peak}");

        let outcomes = run(&mut matcher, 0.0, 400);
        let volumes: Vec<f32> = outcomes.iter().map(|o| o.volume).collect();
        assert!(volumes.windows(2).all(|w| w[1] <= w[0] + 1e-3));
        assert!(volumes.iter().all(|&v| v >= BASELINE_VOLUME));
        assert!((matcher.last_volume() - BASELINE_VOLUME).abs() < 0.5);
        assert!(outcomes.iter().any(|o| o.decision == TickDecision::Decaying));

        let emitted: Vec<u8> = outcomes.iter().filter_map(|o| o.emitted).collect();
        assert!(!emitted.is_empty());
        assert!(emitted.windows(2).all(|w| w[1] <= w[0]));
        assert!(emitted.iter().all(|&v| v >= 40));
    }

    #[test]
    fn decay_never_raises_volume() {
        let config = VolumeMatcherConfig {
            min_volume: 10.0,
            ..Default::default()
        };
        let mut matcher = VolumeMatcher::new(config);
        run(&mut matcher, 0.002, 5);
        let before = matcher.last_volume();
        let outcome = matcher.tick(0.0);
        assert_eq!(outcome.decision, TickDecision::Held);
        assert_eq!(matcher.last_volume(), before);
    }

    #[test]
    fn extreme_input_respects_max_volume() {
        let config = VolumeMatcherConfig {
            max_volume: 55.0,
            ..Default::default()
        };
        let mut matcher = VolumeMatcher::new(config);
        for outcome in run(&mut matcher, 1.0, 100) {
            assert!(outcome.volume <= 55.0);
            if let Some(percent) = outcome.emitted {
                assert!(percent <= 55);
            }
        }
        assert_eq!(matcher.last_volume(), 55.0);
    }

    #[test]
    fn small_changes_update_state_without_emitting() {
        let config = VolumeMatcherConfig {
            min_change_percent: 50.0,
            ..Default::default()
        };
        let mut matcher = VolumeMatcher::new(config);
        let start = matcher.last_volume();
        let outcome = matcher.tick(1.0);
        assert_eq!(outcome.decision, TickDecision::Adjusting);
        assert!(outcome.emitted.is_none());
        assert!(matcher.last_volume() > start);
    }

    #[test]
    fn non_finite_reading_counts_as_silence() {
        let mut matcher = VolumeMatcher::new(VolumeMatcherConfig::default());
        let outcome = matcher.tick(f32::NAN);
        assert_eq!(outcome.mic_level, 0.0);
    }

    #[test]
    fn unvalidated_bounds_do_not_panic() {
        let inverted = VolumeMatcherConfig {
            min_volume: 90.0,
            max_volume: 20.0,
            ..Default::default()
        };
        let mut matcher = VolumeMatcher::new(inverted);
        assert_eq!(matcher.last_volume(), 20.0);
        assert_eq!(matcher.tick(1.0).volume, 20.0);

        let nan = VolumeMatcherConfig {
            min_volume: f32::NAN,
            max_volume: f32::NAN,
            ..Default::default()
        };
        assert_eq!(VolumeMatcher::new(nan).last_volume(), BASELINE_VOLUME);
    }
}
