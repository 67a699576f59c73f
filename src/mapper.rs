//! Piecewise-linear mapping between the playback clock and notation ticks.
//!
//! Both directions sort a private copy of the anchors by the source axis,
//! interpolate inside the known range and extrapolate linearly outside it.
//! Anchors sharing a source value are not merged: the first bracket in
//! sort order that contains the query wins, and zero-length brackets are
//! skipped so they never divide by zero.

use crate::sync::SyncPoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    AudioTime,
    Tick,
}

impl Axis {
    fn of(self, point: &SyncPoint) -> f64 {
        match self {
            Axis::AudioTime => point.audio_time,
            Axis::Tick => point.tab_tick,
        }
    }
}

/// Notation tick that corresponds to `audio_time` seconds of playback.
///
/// Returns `None` when no anchors are available, so callers can leave the
/// highlighted position untouched instead of jumping to zero.
pub fn interpolate_tick_position(audio_time: f64, points: &[SyncPoint]) -> Option<f64> {
    interpolate(audio_time, points, Axis::AudioTime, Axis::Tick)
}

/// Playback time, in seconds, that corresponds to notation tick `tick`.
pub fn interpolate_audio_time(tick: f64, points: &[SyncPoint]) -> Option<f64> {
    interpolate(tick, points, Axis::Tick, Axis::AudioTime)
}

fn interpolate(query: f64, points: &[SyncPoint], source: Axis, target: Axis) -> Option<f64> {
    if points.is_empty() || !query.is_finite() {
        return None;
    }

    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| source.of(a).total_cmp(&source.of(b)));

    let first = &sorted[0];
    let last = &sorted[sorted.len() - 1];
    if sorted.len() == 1 {
        return Some(target.of(first));
    }

    if query < source.of(first) {
        let value = extrapolate(query, first, &sorted[1], first, source, target);
        return Some(value.max(0.0));
    }

    if query >= source.of(last) {
        let previous = &sorted[sorted.len() - 2];
        return Some(extrapolate(query, previous, last, last, source, target));
    }

    let bracket = sorted.windows(2).find(|pair| {
        let (start, end) = (source.of(&pair[0]), source.of(&pair[1]));
        end > start && start <= query && query <= end
    });
    let value = match bracket {
        Some(pair) => {
            let (p1, p2) = (&pair[0], &pair[1]);
            let progress = (query - source.of(p1)) / (source.of(p2) - source.of(p1));
            target.of(p1) + progress * (target.of(p2) - target.of(p1))
        }
        None => target.of(last),
    };
    Some(value)
}

// Extends the segment `a -> b` through `pivot`; a flat segment yields the pivot's value.
fn extrapolate(
    query: f64,
    a: &SyncPoint,
    b: &SyncPoint,
    pivot: &SyncPoint,
    source: Axis,
    target: Axis,
) -> f64 {
    let run = source.of(b) - source.of(a);
    if run == 0.0 {
        return target.of(pivot);
    }
    let slope = (target.of(b) - target.of(a)) / run;
    target.of(pivot) + (query - source.of(pivot)) * slope
}
