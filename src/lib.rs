//! Real-time practice feedback: a volume controller that keeps a backing
//! track balanced against live microphone input, and a time mapper that
//! links the playback clock to notation ticks.

pub mod analysis;
pub mod config;
pub mod controller;
pub mod error;
pub mod level;
pub mod mapper;
pub mod matcher;
pub mod playback;
pub mod session;
pub mod smoothing;
pub mod sync;

pub use analysis::{AnalyserBuffer, AudioContext, ContextState, MicCapture, TimeDomainSource};
pub use config::VolumeMatcherConfig;
pub use controller::{ControllerState, ControllerStatus, VolumeController};
pub use error::{CaptureError, ConfigError, SessionError, SyncError};
pub use level::rms_u8;
pub use mapper::{interpolate_audio_time, interpolate_tick_position};
pub use matcher::{TickDecision, TickOutcome, VolumeMatcher};
pub use playback::{ClickTrack, PlaybackEngine, PlaybackGain, PlaybackState, PlaybackTap};
pub use session::PracticeSession;
pub use smoothing::Smoother;
pub use sync::{SyncPoint, SyncPointStore};
