use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use anyhow::{Context, Result};
use macroquad::{prelude::*, text::measure_text};
use practice_monitor::{
    AudioContext, ContextState, ControllerState, PlaybackEngine, PlaybackGain, PracticeSession, SyncPointStore,
    TickDecision, VolumeController, config::BASELINE_VOLUME,
};
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SCREEN_WIDTH: f32 = 960.0;
const SCREEN_HEIGHT: f32 = 420.0;
const MARGIN: f32 = 36.0;
const METER_WIDTH: f32 = 260.0;
const METER_HEIGHT: f32 = 22.0;
const MIC_METER_HEADROOM: f32 = 4.0;

const AMBER: Color = Color {
    r: 0.98,
    g: 0.66,
    b: 0.12,
    a: 1.0,
};
const AMBER_DIM: Color = Color {
    r: 0.78,
    g: 0.52,
    b: 0.08,
    a: 0.4,
};
const BACKGROUND: Color = Color {
    r: 0.02,
    g: 0.02,
    b: 0.02,
    a: 1.0,
};

#[macroquad::main(window_conf)]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        error!("{err:#}");
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Practice Monitor".into(),
        fullscreen: false,
        sample_count: 1,
        window_width: SCREEN_WIDTH as i32,
        window_height: SCREEN_HEIGHT as i32,
        high_dpi: false,
        ..Default::default()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn run() -> Result<()> {
    let session = match std::env::args().nth(1) {
        Some(path) => PracticeSession::load(&PathBuf::from(path))?,
        None => PracticeSession::default(),
    };
    let sync_store = session.sync_store().context("load sync points")?;
    info!(
        title = session.display_title(),
        anchors = sync_store.len(),
        "practice session opened"
    );

    let runtime = Runtime::new().context("tokio runtime")?;
    let mut context = AudioContext::new();
    let gain = PlaybackGain::new(BASELINE_VOLUME as u8);
    let engine = PlaybackEngine::start(&mut context, &session.backing_track, gain.clone())?;

    let mut controller = VolumeController::new(session.volume_matcher.clone())?;
    controller.set_gain(gain.clone());
    if let Some(tap) = engine.take_tap() {
        controller.connect_playback_source(tap);
    }
    let mic_ready = controller.init_microphone(&mut context);
    if !mic_ready {
        warn!("running without volume matching");
    }

    let last_change = Arc::new(AtomicU8::new(gain.percent()));
    if mic_ready {
        start_matching(&mut controller, &runtime, &last_change);
    }

    let timeline = Rect::new(MARGIN, SCREEN_HEIGHT - 110.0, SCREEN_WIDTH - MARGIN * 2.0, 48.0);
    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        if is_key_pressed(KeyCode::P) {
            match context.state() {
                ContextState::Running => context.suspend(),
                ContextState::Suspended => {
                    context.resume();
                }
            }
        }
        if is_key_pressed(KeyCode::Space) && mic_ready {
            match controller.state() {
                ControllerState::Active => controller.stop(),
                ControllerState::Idle => start_matching(&mut controller, &runtime, &last_change),
            }
        }

        let position = engine.position_seconds();
        let tick = sync_store.tick_at(position);

        if is_mouse_button_pressed(MouseButton::Left) {
            let (x, y) = mouse_position();
            if let Some(target) = seek_target(&sync_store, timeline, vec2(x, y)) {
                info!(seconds = target, "seek");
                engine.seek(target);
            }
        }

        clear_background(BACKGROUND);
        draw_header(&session, &controller, context.state(), mic_ready);
        draw_meters(&controller, &gain, last_change.load(Ordering::Relaxed));
        draw_timeline(
            timeline,
            &sync_store,
            tick,
            &engine,
            session.backing_track.ticks_per_beat,
        );

        next_frame().await;
    }

    controller.cleanup();
    Ok(())
}

fn start_matching(controller: &mut VolumeController, runtime: &Runtime, last_change: &Arc<AtomicU8>) {
    let sink = last_change.clone();
    controller.start(runtime.handle(), move |percent| {
        sink.store(percent, Ordering::Relaxed);
    });
}

fn seek_target(store: &SyncPointStore, timeline: Rect, point: Vec2) -> Option<f64> {
    if !timeline.contains(point) {
        return None;
    }
    let last_tick = store.last_tick()?;
    let fraction = ((point.x - timeline.x) / timeline.w).clamp(0.0, 1.0) as f64;
    store
        .audio_time_at(fraction * last_tick)
        .map(|seconds| seconds.max(0.0))
}

fn draw_header(
    session: &PracticeSession,
    controller: &VolumeController,
    context: ContextState,
    mic_ready: bool,
) {
    draw_text_ex(
        session.display_title(),
        MARGIN,
        MARGIN + 12.0,
        TextParams {
            font_size: 32,
            color: AMBER,
            ..Default::default()
        },
    );
    if let Some(mic) = controller.microphone() {
        draw_caption(
            &format!("{}  {} Hz", mic.device_name(), mic.sample_rate()),
            MARGIN,
            MARGIN + 34.0,
        );
    }
    let status = controller.status();
    let mode = match (mic_ready, status.state, status.last_decision) {
        _ if context == ContextState::Suspended => "PAUSED  [P]",
        (false, _, _) => "MIC UNAVAILABLE",
        (true, ControllerState::Idle, _) => "MATCHING OFF  [SPACE]",
        (true, ControllerState::Active, Some(TickDecision::Adjusting)) => "FOLLOWING PLAYER",
        (true, ControllerState::Active, Some(TickDecision::Decaying)) => "SETTLING",
        (true, ControllerState::Active, _) => "LISTENING",
    };
    let measure = measure_text(mode, None, 20, 1.0);
    draw_text_ex(
        mode,
        SCREEN_WIDTH - MARGIN - measure.width,
        MARGIN + 8.0,
        TextParams {
            font_size: 20,
            color: AMBER,
            ..Default::default()
        },
    );
}

fn draw_meters(controller: &VolumeController, gain: &PlaybackGain, last_change: u8) {
    let threshold = controller.config().mic_threshold.max(f32::EPSILON);
    let mic_scale = threshold * MIC_METER_HEADROOM;
    let status = controller.status();
    let top = MARGIN + 60.0;

    let mic_rect = Rect::new(MARGIN, top, METER_WIDTH, METER_HEIGHT);
    draw_meter(mic_rect, "MIC", status.mic_level / mic_scale);
    let marker = mic_rect.x + mic_rect.w / MIC_METER_HEADROOM;
    draw_line(marker, mic_rect.y - 4.0, marker, mic_rect.y + mic_rect.h + 4.0, 2.0, AMBER);

    let playback = status.playback_level.unwrap_or(0.0);
    draw_meter(
        Rect::new(MARGIN, top + 60.0, METER_WIDTH, METER_HEIGHT),
        "TRACK",
        playback,
    );

    let volume_rect = Rect::new(MARGIN + METER_WIDTH + 80.0, top, METER_WIDTH, METER_HEIGHT);
    draw_meter(volume_rect, "VOLUME", gain.level());
    draw_caption(
        &format!("{}%  (last change {}%)", gain.percent(), last_change),
        volume_rect.x,
        volume_rect.y + volume_rect.h + 22.0,
    );
}

fn draw_meter(rect: Rect, label: &str, value: f32) {
    draw_caption(label, rect.x, rect.y - 8.0);
    draw_rectangle(
        rect.x,
        rect.y,
        rect.w * value.clamp(0.0, 1.0),
        rect.h,
        AMBER_DIM,
    );
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
}

fn draw_timeline(
    rect: Rect,
    store: &SyncPointStore,
    tick: Option<f64>,
    engine: &PlaybackEngine,
    ticks_per_beat: f64,
) {
    let position = engine.position_seconds();
    let duration = engine.duration_seconds();
    let footer = if engine.is_finished() {
        format!("end of track   {} Hz", engine.sample_rate())
    } else {
        format!("click to seek   {} Hz", engine.sample_rate())
    };
    draw_rectangle_lines(rect.x, rect.y, rect.w, rect.h, 1.0, AMBER);
    let Some(last_tick) = store.last_tick().filter(|t| *t > 0.0) else {
        draw_caption("NO SYNC POINTS", rect.x, rect.y - 10.0);
        return;
    };
    for point in store.sorted_by_tick() {
        let x = rect.x + (point.tab_tick / last_tick) as f32 * rect.w;
        draw_line(x, rect.y, x, rect.y + rect.h * 0.35, 1.0, AMBER_DIM);
    }
    let caption = match tick {
        Some(tick) => {
            let x = rect.x + ((tick / last_tick).clamp(0.0, 1.0) as f32) * rect.w;
            draw_line(x, rect.y - 6.0, x, rect.y + rect.h + 6.0, 2.0, AMBER);
            let beat = tick / ticks_per_beat.max(1.0);
            format!("{position:6.2}s / {duration:.0}s   tick {tick:7.0}   beat {beat:5.1}")
        }
        None => format!("{position:6.2}s / {duration:.0}s"),
    };
    draw_caption(&caption, rect.x, rect.y - 10.0);
    draw_caption(&footer, rect.x, rect.y + rect.h + 24.0);
}

fn draw_caption(text: &str, x: f32, y: f32) {
    draw_text_ex(
        text,
        x,
        y,
        TextParams {
            font_size: 18,
            color: AMBER,
            ..Default::default()
        },
    );
}
