use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::{
    runtime::Handle,
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::analysis::{AudioContext, MicCapture, SharedAnalyser, TimeDomainSource};
use crate::config::VolumeMatcherConfig;
use crate::error::ConfigError;
use crate::level::rms_u8;
use crate::matcher::{TickDecision, VolumeMatcher};
use crate::playback::{PlaybackGain, PlaybackTap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub volume: f32,
    pub mic_level: f32,
    pub playback_level: Option<f32>,
    pub last_decision: Option<TickDecision>,
}

struct LoopShared {
    // Bumped on every start and stop; a loop only acts while it holds the
    // current value.
    generation: u64,
    matcher: VolumeMatcher,
    last_decision: Option<TickDecision>,
    playback: Option<SharedAnalyser>,
    playback_level: Option<f32>,
    gain: Option<PlaybackGain>,
}

impl LoopShared {
    fn new(config: VolumeMatcherConfig) -> Self {
        Self {
            generation: 0,
            matcher: VolumeMatcher::new(config),
            last_decision: None,
            playback: None,
            playback_level: None,
            gain: None,
        }
    }

    fn reset(&mut self, config: VolumeMatcherConfig) {
        let generation = self.generation;
        *self = Self {
            generation,
            ..Self::new(config)
        };
    }
}

struct LoopTask {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl LoopTask {
    fn cancel(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for LoopTask {
    fn drop(&mut self) {
        if self.stop.is_some() {
            self.handle.abort();
        }
    }
}

/// Keeps the backing track at a level that follows the player.
///
/// One controller serves one practice session. It samples its analyser on
/// a fixed interval while active, reporting material volume changes through
/// the callback given to [`start`](Self::start) and, when attached, writing
/// them to the playback gain. No change is reported once [`stop`](Self::stop)
/// has returned. Dropping the controller runs [`cleanup`](Self::cleanup).
pub struct VolumeController {
    config: VolumeMatcherConfig,
    shared: Arc<Mutex<LoopShared>>,
    microphone: Option<MicCapture>,
    source: Option<Arc<dyn TimeDomainSource>>,
    task: Option<LoopTask>,
}

impl VolumeController {
    pub fn new(config: VolumeMatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Arc::new(Mutex::new(LoopShared::new(config.clone())));
        Ok(Self {
            config,
            shared,
            microphone: None,
            source: None,
            task: None,
        })
    }

    pub fn config(&self) -> &VolumeMatcherConfig {
        &self.config
    }

    /// Opens the default microphone. Failure is logged and reported as
    /// `false`; the session can carry on without volume matching.
    pub fn init_microphone(&mut self, context: &mut AudioContext) -> bool {
        if self.microphone.is_some() {
            debug!("microphone already initialized");
            return true;
        }
        match context.open_microphone() {
            Ok(capture) => {
                let analyser: Arc<dyn TimeDomainSource> = capture.analyser();
                self.source = Some(analyser);
                self.microphone = Some(capture);
                true
            }
            Err(err) => {
                warn!(error = %err, "microphone unavailable; volume matching disabled");
                false
            }
        }
    }

    /// Uses `source` in place of a microphone opened through an [`AudioContext`].
    pub fn attach_source(&mut self, source: Arc<dyn TimeDomainSource>) {
        if let Some(capture) = self.microphone.take() {
            capture.release();
        }
        self.source = Some(source);
    }

    pub fn microphone(&self) -> Option<&MicCapture> {
        self.microphone.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Links the backing track into analysis. Only the first connection per
    /// session is kept; later ones are ignored and return `false`.
    pub fn connect_playback_source(&mut self, tap: PlaybackTap) -> bool {
        let mut shared = self.lock_shared();
        if shared.playback.is_some() {
            warn!("playback source already connected; ignoring");
            return false;
        }
        shared.playback = Some(tap.analyser());
        debug!("playback source connected");
        true
    }

    /// Routes emitted volumes to `gain` as well as to the callback.
    pub fn set_gain(&mut self, gain: PlaybackGain) {
        self.lock_shared().gain = Some(gain);
    }

    /// Starts the sampling loop on `handle`. Without a ready analyser this
    /// logs and does nothing.
    pub fn start<F>(&mut self, handle: &Handle, mut on_change: F)
    where
        F: FnMut(u8) + Send + 'static,
    {
        if self.task.is_some() {
            debug!("volume matching already running");
            return;
        }
        let Some(source) = self.source.clone() else {
            warn!("volume matching not started: no analyser initialized");
            return;
        };
        let generation = {
            let mut shared = self.lock_shared();
            shared.generation = shared.generation.wrapping_add(1);
            shared.matcher = VolumeMatcher::new(self.config.clone());
            shared.last_decision = None;
            shared.playback_level = None;
            shared.generation
        };

        let shared = self.shared.clone();
        let period = self.config.update_interval();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let join = handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut buffer = vec![0u8; source.buffer_len().max(1)];
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        run_tick(&*source, &shared, generation, &mut buffer, &mut on_change);
                    }
                }
            }
            debug!("sampling loop exited");
        });
        self.task = Some(LoopTask {
            stop: Some(stop_tx),
            handle: join,
        });
        info!(interval_ms = self.config.update_interval_ms, "volume matching started");
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            {
                let mut shared = self.lock_shared();
                shared.generation = shared.generation.wrapping_add(1);
            }
            task.cancel();
            info!("volume matching stopped");
        }
    }

    /// Stops the loop, releases the microphone and drops all session state.
    /// Safe to call any number of times.
    pub fn cleanup(&mut self) {
        self.stop();
        if let Some(capture) = self.microphone.take() {
            capture.release();
        }
        if self.source.take().is_some() {
            debug!("volume controller cleaned up");
        }
        self.lock_shared().reset(self.config.clone());
    }

    pub fn state(&self) -> ControllerState {
        if self.task.is_some() {
            ControllerState::Active
        } else {
            ControllerState::Idle
        }
    }

    pub fn status(&self) -> ControllerStatus {
        let state = self.state();
        let shared = self.lock_shared();
        ControllerStatus {
            state,
            volume: shared.matcher.last_volume(),
            mic_level: shared.matcher.mic_level(),
            playback_level: shared.playback_level,
            last_decision: shared.last_decision,
        }
    }

    pub fn mic_level(&self) -> f32 {
        self.lock_shared().matcher.mic_level()
    }

    pub fn playback_level(&self) -> Option<f32> {
        self.lock_shared().playback_level
    }

    fn lock_shared(&self) -> MutexGuard<'_, LoopShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for VolumeController {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// The callback runs under the state lock so a concurrent stop() either
// waits for it or makes the tick a no-op.
fn run_tick<F>(
    source: &dyn TimeDomainSource,
    shared: &Mutex<LoopShared>,
    generation: u64,
    buffer: &mut [u8],
    on_change: &mut F,
) -> Option<u8>
where
    F: FnMut(u8),
{
    let filled = source.fill_time_domain(buffer);
    if filled == 0 {
        debug!("analyser returned no samples; skipping tick");
        return None;
    }
    let raw = rms_u8(&buffer[..filled]);

    let mut guard = match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("controller state lock poisoned; recovering");
            poisoned.into_inner()
        }
    };
    if guard.generation != generation {
        debug!("stale sampling loop; skipping tick");
        return None;
    }
    let outcome = guard.matcher.tick(raw);
    guard.last_decision = Some(outcome.decision);

    let playback_level = guard.playback.as_ref().map(|analyser| {
        let count = analyser.fill_time_domain(buffer);
        rms_u8(&buffer[..count])
    });
    guard.playback_level = playback_level;

    if let Some(percent) = outcome.emitted {
        if let Some(gain) = guard.gain.as_ref() {
            gain.set_percent(percent);
        }
        debug!(
            percent,
            mic_level = outcome.mic_level,
            decision = ?outcome.decision,
            "playback volume changed"
        );
        on_change(percent);
    }
    outcome.emitted
}
