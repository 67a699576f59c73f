use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, PoisonError};

use cpal::{
    FromSample, SampleFormat, SizedSample, Stream,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::level::{BYTE_MIDPOINT, to_byte_sample};

/// Samples kept per analyser, matching a typical FFT window.
pub const DEFAULT_FFT_SIZE: usize = 2048;

pub type SharedAnalyser = Arc<Mutex<AnalyserBuffer>>;

/// Anything that can hand out the most recent unsigned 8-bit time-domain
/// samples of a signal.
pub trait TimeDomainSource: Send + Sync {
    /// Copies the newest samples into `out`, oldest first, and returns how
    /// many were written.
    fn fill_time_domain(&self, out: &mut [u8]) -> usize;

    fn buffer_len(&self) -> usize {
        DEFAULT_FFT_SIZE
    }
}

/// Fixed-size ring of byte samples. Starts out full of silence.
pub struct AnalyserBuffer {
    buffer: Vec<u8>,
    cursor: usize,
}

impl AnalyserBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![BYTE_MIDPOINT as u8; size.max(1)],
            cursor: 0,
        }
    }

    pub fn shared(size: usize) -> SharedAnalyser {
        Arc::new(Mutex::new(Self::new(size)))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn push(&mut self, value: u8) {
        if let Some(slot) = self.buffer.get_mut(self.cursor) {
            *slot = value;
        }
        self.cursor = (self.cursor + 1) % self.buffer.len();
    }

    pub fn push_sample(&mut self, sample: f32) {
        self.push(to_byte_sample(sample));
    }

    pub fn copy_latest(&self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.buffer.len());
        let start = (self.cursor + self.buffer.len() - count) % self.buffer.len();
        for (offset, slot) in out[..count].iter_mut().enumerate() {
            *slot = self.buffer[(start + offset) % self.buffer.len()];
        }
        count
    }
}

impl TimeDomainSource for Mutex<AnalyserBuffer> {
    fn fill_time_domain(&self, out: &mut [u8]) -> usize {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .copy_latest(out)
    }

    fn buffer_len(&self) -> usize {
        self.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
}

/// Owner of the platform audio host and of every stream opened through it.
///
/// The host is created lazily on first use and reused afterwards. Suspending
/// pauses all live streams; a suspended context is resumed, and its streams
/// played again, whenever a device is requested from it.
pub struct AudioContext {
    host: Option<cpal::Host>,
    state: ContextState,
    fft_size: usize,
    streams: Vec<Weak<Stream>>,
}

impl AudioContext {
    pub fn new() -> Self {
        Self {
            host: None,
            state: ContextState::Suspended,
            fft_size: DEFAULT_FFT_SIZE,
            streams: Vec::new(),
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.host.is_some()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn resume(&mut self) -> &cpal::Host {
        if self.state == ContextState::Suspended {
            for stream in self.live_streams() {
                if let Err(err) = stream.play() {
                    warn!("failed to resume stream: {err}");
                }
            }
            debug!("audio context running");
            self.state = ContextState::Running;
        }
        self.host.get_or_insert_with(|| {
            let host = cpal::default_host();
            info!(host = ?host.id(), "audio context created");
            host
        })
    }

    pub fn suspend(&mut self) {
        if self.state == ContextState::Running {
            for stream in self.live_streams() {
                if let Err(err) = stream.pause() {
                    warn!("failed to suspend stream: {err}");
                }
            }
            debug!("audio context suspended");
            self.state = ContextState::Suspended;
        }
    }

    /// Puts a started stream under this context's suspend/resume control.
    pub(crate) fn adopt(&mut self, stream: Stream) -> Rc<Stream> {
        let stream = Rc::new(stream);
        self.streams.push(Rc::downgrade(&stream));
        stream
    }

    fn live_streams(&mut self) -> Vec<Rc<Stream>> {
        self.streams.retain(|stream| stream.strong_count() > 0);
        self.streams.iter().filter_map(Weak::upgrade).collect()
    }

    /// Opens the default input device and starts feeding an analyser.
    pub fn open_microphone(&mut self) -> Result<MicCapture, CaptureError> {
        let fft_size = self.fft_size;
        let host = self.resume();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice("input"))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device
            .default_input_config()
            .map_err(|err| classify("default input config", err.to_string()))?;
        let config = supported.config();
        if config.channels == 0 {
            return Err(CaptureError::DeviceInit(format!(
                "{device_name} reported zero input channels"
            )));
        }
        let analyser = AnalyserBuffer::shared(fft_size);
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, analyser.clone())?,
            SampleFormat::I16 => build_input::<i16>(&device, &config, analyser.clone())?,
            SampleFormat::U16 => build_input::<u16>(&device, &config, analyser.clone())?,
            SampleFormat::I32 => build_input::<i32>(&device, &config, analyser.clone())?,
            other => {
                return Err(CaptureError::DeviceInit(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|err| classify("start input stream", err.to_string()))?;
        info!(
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "microphone capture started"
        );
        Ok(MicCapture {
            stream: self.adopt(stream),
            analyser,
            device_name,
            sample_rate: config.sample_rate.0,
        })
    }
}

impl Default for AudioContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A running microphone stream plus the analyser it feeds.
pub struct MicCapture {
    stream: Rc<Stream>,
    analyser: SharedAnalyser,
    device_name: String,
    sample_rate: u32,
}

impl MicCapture {
    pub fn analyser(&self) -> SharedAnalyser {
        self.analyser.clone()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stops the stream and hands the device back to the platform.
    pub fn release(self) {
        if let Err(err) = self.stream.pause() {
            warn!("failed to pause microphone stream: {err}");
        }
        info!(device = %self.device_name, "microphone released");
    }
}

fn classify(action: &str, message: String) -> CaptureError {
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        CaptureError::PermissionDenied(message)
    } else if lowered.contains("not available") || lowered.contains("no longer available") {
        CaptureError::NoDevice("input")
    } else {
        CaptureError::StreamCreate(format!("{action}: {message}"))
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    analyser: SharedAnalyser,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |input: &[T], _: &cpal::InputCallbackInfo| {
                push_input_buffer(input, channels, &analyser);
            },
            move |err| warn!("microphone stream error: {err}"),
            None,
        )
        .map_err(|err| classify("build input stream", err.to_string()))
}

// Interleaved frames are averaged down to mono before analysis.
fn push_input_buffer<T>(input: &[T], channels: usize, analyser: &SharedAnalyser)
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut guard = analyser.lock().unwrap_or_else(PoisonError::into_inner);
    for frame in input.chunks(channels.max(1)) {
        let sum = frame
            .iter()
            .map(|&sample| f32::from_sample_(sample))
            .sum::<f32>();
        guard.push_sample(sum / frame.len() as f32);
    }
}
