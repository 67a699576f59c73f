use practice_monitor::{
    ClickTrack, PracticeSession, SyncPoint, SyncPointStore, interpolate_audio_time,
    interpolate_tick_position,
};

fn anchors(pairs: &[(f64, f64)]) -> Vec<SyncPoint> {
    pairs.iter().map(|&(t, tick)| SyncPoint::new(t, tick)).collect()
}

#[test]
fn documented_mapping_cases_hold() {
    let single = anchors(&[(5.0, 100.0)]);
    assert_eq!(interpolate_tick_position(0.0, &single), Some(100.0));
    assert_eq!(interpolate_tick_position(999.0, &single), Some(100.0));

    let pair = anchors(&[(0.0, 0.0), (10.0, 100.0)]);
    assert_eq!(interpolate_tick_position(5.0, &pair), Some(50.0));
    assert_eq!(interpolate_tick_position(-5.0, &pair), Some(0.0));
    assert_eq!(interpolate_tick_position(20.0, &pair), Some(200.0));

    assert_eq!(interpolate_tick_position(3.0, &[]), None);
    assert_eq!(interpolate_audio_time(3.0, &[]), None);
}

#[test]
fn round_trip_holds_for_irregular_tempo() {
    let sets = [
        anchors(&[(0.0, 0.0), (1.0, 960.0)]),
        anchors(&[(3.2, 0.0), (1.1, -10.0), (9.75, 7680.0), (5.0, 1920.0)]),
        anchors(&[(0.25, 0.0), (0.8, 480.0), (1.9, 1440.0), (2.0, 1920.0), (12.0, 2400.0)]),
    ];
    for points in &sets {
        let mut times: Vec<f64> = points.iter().map(|p| p.audio_time).collect();
        times.sort_by(f64::total_cmp);
        let (lo, hi) = (times[0], times[times.len() - 1]);
        for step in 1..100 {
            let t = lo + (hi - lo) * step as f64 / 100.0;
            let tick = interpolate_tick_position(t, points).unwrap();
            let back = interpolate_audio_time(tick, points).unwrap();
            assert!((back - t).abs() < 1e-9, "t={t} tick={tick} back={back}");
        }
    }
}

#[test]
fn count_in_predicts_ticks_before_the_first_bar() {
    let track = ClickTrack {
        tempo_bpm: 120.0,
        beats_per_bar: 4,
        bars: 4,
        count_in_bars: 1,
        ticks_per_beat: 480.0,
    };
    let store = SyncPointStore::validated(track.sync_points()).unwrap();
    // first notated bar starts after a two second count-in
    assert_eq!(store.tick_at(2.0), Some(0.0));
    assert_eq!(store.tick_at(1.0), Some(0.0));
    assert_eq!(store.tick_at(3.0), Some(960.0));
    assert_eq!(store.tick_at(12.0), Some(9600.0));
    assert_eq!(store.audio_time_at(1920.0), Some(4.0));
}

#[test]
fn seek_target_round_trips_through_a_session() {
    let session = PracticeSession::from_yaml_str(
        r#"
sync_points:
  - { audioTime: 0.6, tabTick: 0 }
  - { audioTime: 2.6, tabTick: 3840 }
  - { audioTime: 4.4, tabTick: 7680 }
"#,
    )
    .unwrap();
    let store = session.sync_store().unwrap();
    let seek = store.audio_time_at(5760.0).unwrap();
    assert!((seek - 3.5).abs() < 1e-9);
    let tick = store.tick_at(seek).unwrap();
    assert!((tick - 5760.0).abs() < 1e-6);
}
