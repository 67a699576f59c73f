use std::sync::{Arc, Mutex};
use std::time::Duration;

use practice_monitor::{
    ControllerState, PlaybackGain, PlaybackState, TickDecision, TimeDomainSource,
    VolumeController, VolumeMatcherConfig,
};
use tokio::runtime::Handle;

/// Test source whose buffer can be swapped between ticks.
struct ScriptedSource {
    bytes: Mutex<Vec<u8>>,
}

impl ScriptedSource {
    fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            bytes: Mutex::new(bytes),
        })
    }

    fn set(&self, bytes: Vec<u8>) {
        *self.bytes.lock().unwrap() = bytes;
    }
}

impl TimeDomainSource for ScriptedSource {
    fn fill_time_domain(&self, out: &mut [u8]) -> usize {
        let bytes = self.bytes.lock().unwrap();
        let count = out.len().min(bytes.len());
        out[..count].copy_from_slice(&bytes[..count]);
        count
    }

    fn buffer_len(&self) -> usize {
        1024
    }
}

fn loud() -> Vec<u8> {
    (0..1024).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect()
}

fn silent() -> Vec<u8> {
    vec![128; 1024]
}

fn recorder() -> (Arc<Mutex<Vec<u8>>>, impl FnMut(u8) + Send + 'static) {
    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = emitted.clone();
    (emitted, move |percent| sink.lock().unwrap().push(percent))
}

async fn ticks(count: u64) {
    tokio::time::sleep(Duration::from_millis(200 * count + 10)).await;
}

#[tokio::test(start_paused = true)]
async fn loud_input_ramps_volume_then_settles() {
    let source = ScriptedSource::new(loud());
    let gain = PlaybackGain::new(40);
    let mut controller = VolumeController::new(VolumeMatcherConfig::default()).unwrap();
    controller.attach_source(source.clone());
    controller.set_gain(gain.clone());

    let (emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);
    assert_eq!(controller.state(), ControllerState::Active);

    ticks(30).await;
    assert_eq!(*emitted.lock().unwrap(), vec![68, 76, 79]);
    assert_eq!(gain.percent(), 79);

    let status = controller.status();
    assert_eq!(status.last_decision, Some(TickDecision::Adjusting));
    assert!((status.volume - 80.0).abs() < 0.01);
    assert!(status.mic_level > 0.9);
}

#[tokio::test(start_paused = true)]
async fn no_tick_runs_before_the_first_interval() {
    let source = ScriptedSource::new(loud());
    let mut controller = VolumeController::new(VolumeMatcherConfig::default()).unwrap();
    controller.attach_source(source);
    let (emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(emitted.lock().unwrap().is_empty());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*emitted.lock().unwrap(), vec![68]);
}

#[tokio::test(start_paused = true)]
async fn silence_after_playing_decays_to_baseline() {
    let config = VolumeMatcherConfig {
        min_change_percent: 1.0,
        ..Default::default()
    };
    let source = ScriptedSource::new(loud());
    let mut controller = VolumeController::new(config).unwrap();
    controller.attach_source(source.clone());
    let (emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);

    ticks(20).await;
    let ramp = emitted.lock().unwrap().len();
    source.set(silent());
    ticks(300).await;

    let status = controller.status();
    assert!(matches!(
        status.last_decision,
        Some(TickDecision::Decaying | TickDecision::Held)
    ));
    assert!((status.volume - 40.0).abs() < 0.5, "volume={}", status.volume);

    let decay: Vec<u8> = emitted.lock().unwrap()[ramp..].to_vec();
    assert!(!decay.is_empty());
    assert!(decay.windows(2).all(|w| w[1] <= w[0]), "{decay:?}");
    assert!(decay.iter().all(|&v| v >= 40));
}

#[tokio::test(start_paused = true)]
async fn stop_halts_emission_and_restart_resets_state() {
    let source = ScriptedSource::new(loud());
    let mut controller = VolumeController::new(VolumeMatcherConfig::default()).unwrap();
    controller.attach_source(source);
    let (emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);
    ticks(2).await;
    assert_eq!(*emitted.lock().unwrap(), vec![68, 76]);

    controller.stop();
    assert_eq!(controller.state(), ControllerState::Idle);
    ticks(10).await;
    assert_eq!(emitted.lock().unwrap().len(), 2);

    let (restarted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);
    ticks(1).await;
    assert_eq!(*restarted.lock().unwrap(), vec![68]);
    controller.cleanup();
}

#[tokio::test(start_paused = true)]
async fn start_without_source_is_a_no_op() {
    let mut controller = VolumeController::new(VolumeMatcherConfig::default()).unwrap();
    let (emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);
    assert_eq!(controller.state(), ControllerState::Idle);
    ticks(5).await;
    assert!(emitted.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_idempotent_and_drops_the_source() {
    let mut controller = VolumeController::new(VolumeMatcherConfig::default()).unwrap();
    controller.attach_source(ScriptedSource::new(loud()));
    let (_emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);
    ticks(3).await;

    controller.cleanup();
    controller.cleanup();
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(!controller.has_source());
    assert_eq!(controller.status().last_decision, None);
    assert_eq!(controller.status().volume, 40.0);
}

#[tokio::test(start_paused = true)]
async fn playback_connects_once_and_is_measured() {
    let mut first = PlaybackState::new(vec![0.0; 16], 100.0, PlaybackGain::new(100));
    let mut second = PlaybackState::new(vec![0.0; 16], 100.0, PlaybackGain::new(100));
    let tap = first.issue_tap(1024).unwrap();
    let analyser = tap.analyser();
    {
        let mut guard = analyser.lock().unwrap();
        for _ in 0..1024 {
            guard.push_sample(0.5);
        }
    }

    let mut controller = VolumeController::new(VolumeMatcherConfig::default()).unwrap();
    assert!(controller.connect_playback_source(tap));
    assert!(!controller.connect_playback_source(second.issue_tap(1024).unwrap()));

    controller.attach_source(ScriptedSource::new(silent()));
    let (_emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);
    ticks(1).await;

    let level = controller.playback_level().unwrap();
    assert!((level - 0.5).abs() < 0.01, "level={level}");
}

#[tokio::test(start_paused = true)]
async fn emitted_volume_stays_within_bounds() {
    let config = VolumeMatcherConfig {
        min_volume: 20.0,
        max_volume: 60.0,
        min_change_percent: 0.0,
        ..Default::default()
    };
    let mut controller = VolumeController::new(config).unwrap();
    controller.attach_source(ScriptedSource::new(vec![255; 1024]));
    let (emitted, on_change) = recorder();
    controller.start(&Handle::current(), on_change);
    ticks(40).await;

    let emitted = emitted.lock().unwrap();
    assert!(!emitted.is_empty());
    assert!(emitted.iter().all(|&v| (20..=60).contains(&v)));
    assert_eq!(emitted.last(), Some(&60));
}
