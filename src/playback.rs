use std::f32::consts::TAU;
use std::rc::Rc;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU32, Ordering},
};

use anyhow::{Context, Result, anyhow, bail};
use cpal::{
    FromSample, SampleFormat, SizedSample, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::{AnalyserBuffer, AudioContext, SharedAnalyser};
use crate::sync::SyncPoint;

pub type SharedPlayback = Arc<Mutex<PlaybackState>>;

const CLICK_SECONDS: f32 = 0.03;
const CLICK_AMPLITUDE: f32 = 0.6;
const DOWNBEAT_HZ: f32 = 1_500.0;
const BEAT_HZ: f32 = 1_000.0;

/// Backing-track gain shared between the controller and the audio callback.
#[derive(Clone, Debug)]
pub struct PlaybackGain {
    bits: Arc<AtomicU32>,
}

impl PlaybackGain {
    pub fn new(percent: u8) -> Self {
        let gain = Self {
            bits: Arc::new(AtomicU32::new(0)),
        };
        gain.set_percent(percent);
        gain
    }

    pub fn set_percent(&self, percent: u8) {
        let level = f32::from(percent.min(100)) / 100.0;
        self.bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn percent(&self) -> u8 {
        (self.level() * 100.0).round() as u8
    }
}

/// Generated metronome used as a stand-in backing track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickTrack {
    pub tempo_bpm: f64,
    pub beats_per_bar: u32,
    pub bars: u32,
    pub count_in_bars: u32,
    pub ticks_per_beat: f64,
}

impl Default for ClickTrack {
    fn default() -> Self {
        Self {
            tempo_bpm: 96.0,
            beats_per_bar: 4,
            bars: 16,
            count_in_bars: 1,
            ticks_per_beat: 960.0,
        }
    }
}

impl ClickTrack {
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo_bpm.max(1.0)
    }

    pub fn total_beats(&self) -> u32 {
        self.count_in_bars
            .saturating_add(self.bars)
            .saturating_mul(self.beats_per_bar)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.total_beats() as f64 * self.seconds_per_beat()
    }

    pub fn render(&self, sample_rate: f32) -> Vec<f32> {
        let rate = sample_rate.max(1.0);
        let length = (self.duration_seconds() * rate as f64).ceil() as usize;
        let mut samples = vec![0.0; length];
        let click_len = (CLICK_SECONDS * rate) as usize;
        for beat in 0..self.total_beats() {
            let start = (beat as f64 * self.seconds_per_beat() * rate as f64) as usize;
            let freq = if beat % self.beats_per_bar.max(1) == 0 {
                DOWNBEAT_HZ
            } else {
                BEAT_HZ
            };
            for n in 0..click_len {
                let Some(slot) = samples.get_mut(start + n) else {
                    break;
                };
                let t = n as f32 / rate;
                let envelope = (-t / (CLICK_SECONDS * 0.25)).exp();
                *slot = (t * freq * TAU).sin() * envelope * CLICK_AMPLITUDE;
            }
        }
        samples
    }

    /// One anchor per notated bar line, the count-in sitting before tick zero.
    pub fn sync_points(&self) -> Vec<SyncPoint> {
        let bar_seconds = self.seconds_per_beat() * self.beats_per_bar as f64;
        let bar_ticks = self.ticks_per_beat * self.beats_per_bar as f64;
        (0..=self.bars)
            .map(|bar| {
                SyncPoint::new(
                    (self.count_in_bars as f64 + bar as f64) * bar_seconds,
                    bar as f64 * bar_ticks,
                )
            })
            .collect()
    }
}

/// Receiving end of the one-time link from playback into analysis.
pub struct PlaybackTap {
    analyser: SharedAnalyser,
}

impl PlaybackTap {
    pub fn analyser(&self) -> SharedAnalyser {
        self.analyser.clone()
    }
}

pub struct PlaybackState {
    samples: Vec<f32>,
    sample_rate: f32,
    cursor: usize,
    gain: PlaybackGain,
    tap: Option<SharedAnalyser>,
    tap_issued: bool,
}

impl PlaybackState {
    pub fn new(samples: Vec<f32>, sample_rate: f32, gain: PlaybackGain) -> Self {
        Self {
            samples,
            sample_rate: sample_rate.max(1.0),
            cursor: 0,
            gain,
            tap: None,
            tap_issued: false,
        }
    }

    pub fn position_seconds(&self) -> f64 {
        self.cursor as f64 / self.sample_rate as f64
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.samples.len()
    }

    pub fn seek(&mut self, seconds: f64) {
        let frame = (seconds.max(0.0) * self.sample_rate as f64) as usize;
        self.cursor = frame.min(self.samples.len());
    }

    /// Hands out the analysis tap. A playback stream can feed exactly one
    /// analyser, so every later request returns `None`.
    pub fn issue_tap(&mut self, fft_size: usize) -> Option<PlaybackTap> {
        if self.tap_issued {
            warn!("playback source is already connected to an analyser");
            return None;
        }
        self.tap_issued = true;
        let analyser = AnalyserBuffer::shared(fft_size);
        self.tap = Some(analyser.clone());
        Some(PlaybackTap { analyser })
    }

    pub fn next_sample(&mut self) -> f32 {
        let Some(&sample) = self.samples.get(self.cursor) else {
            return 0.0;
        };
        self.cursor += 1;
        sample * self.gain.level()
    }

    fn tap(&self) -> Option<SharedAnalyser> {
        self.tap.clone()
    }
}

/// Backing-track output stream.
pub struct PlaybackEngine {
    _stream: Rc<Stream>,
    state: SharedPlayback,
    sample_rate: u32,
    fft_size: usize,
}

impl PlaybackEngine {
    pub fn start(context: &mut AudioContext, track: &ClickTrack, gain: PlaybackGain) -> Result<Self> {
        let fft_size = context.fft_size();
        let host = context.resume();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default audio output"))?;
        let supported = device
            .default_output_config()
            .context("query default output config")?;
        let config = supported.config();
        let sample_rate = config.sample_rate.0;
        let samples = track.render(sample_rate as f32);
        let state = Arc::new(Mutex::new(PlaybackState::new(
            samples,
            sample_rate as f32,
            gain,
        )));
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, state.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, state.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, state.clone())?,
            SampleFormat::I32 => build_stream::<i32>(&device, &config, state.clone())?,
            other => bail!("unsupported output sample format {other:?}"),
        };
        stream.play().context("start playback stream")?;
        info!(sample_rate, "backing track playing");
        Ok(Self {
            _stream: context.adopt(stream),
            state,
            sample_rate,
            fft_size,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn position_seconds(&self) -> f64 {
        self.lock().position_seconds()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.lock().duration_seconds()
    }

    pub fn is_finished(&self) -> bool {
        self.lock().is_finished()
    }

    pub fn seek(&self, seconds: f64) {
        self.lock().seek(seconds);
    }

    pub fn take_tap(&self) -> Option<PlaybackTap> {
        self.lock().issue_tap(self.fft_size)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: SharedPlayback,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
            fill_output_buffer(output, channels, &state);
        },
        move |err| warn!("playback stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

// Every channel of a frame carries the same mono sample.
fn fill_output_buffer<T>(output: &mut [T], channels: usize, state: &SharedPlayback)
where
    T: SizedSample + FromSample<f32>,
{
    let mut playback = state.lock().unwrap_or_else(PoisonError::into_inner);
    let tap = playback.tap();
    let mut tap_guard = tap
        .as_ref()
        .map(|analyser| analyser.lock().unwrap_or_else(PoisonError::into_inner));
    for frame in output.chunks_mut(channels.max(1)) {
        let sample = playback.next_sample().clamp(-0.98, 0.98);
        if let Some(analyser) = tap_guard.as_mut() {
            analyser.push_sample(sample);
        }
        let value = T::from_sample_(sample);
        for channel in frame {
            *channel = value;
        }
    }
}
