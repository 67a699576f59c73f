use thiserror::Error;

/// Failures while acquiring or running an audio device.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("microphone access was denied: {0}")]
    PermissionDenied(String),

    #[error("no audio {0} device available")]
    NoDevice(&'static str),

    #[error("device init error: {0}")]
    DeviceInit(String),

    #[error("stream create error: {0}")]
    StreamCreate(String),

    #[error("playback error: {0}")]
    Playback(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("min_volume ({min}) exceeds max_volume ({max})")]
    InvertedVolumeBounds { min: f32, max: f32 },
}

#[derive(Error, Debug, PartialEq)]
pub enum SyncError {
    #[error("sync point {index} has a non-finite value")]
    NonFinite { index: usize },

    #[error("sync point {index} has negative audio time {audio_time}")]
    NegativeAudioTime { index: usize, audio_time: f64 },

    #[error("tick decreases from {previous} to {current} at audio time {audio_time}s")]
    NonMonotonic {
        audio_time: f64,
        previous: f64,
        current: f64,
    },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid session document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}
