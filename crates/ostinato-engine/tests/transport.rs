//! Live-path scenarios driven through a manually pumped backend: looping,
//! preview notes across transport changes, graph swaps under load, and
//! end-of-arrangement behavior.

mod common;

use ostinato_engine::EngineConfig;

const BLOCK: usize = 512;

const LOOP_SCHEDULE: &str = r#"{
    "events": [
        {"beat": 0.0, "type": "note_on", "node_id": "track",
         "channel": 0, "pitch": 60, "velocity": 100},
        {"beat": 0.5, "type": "note_off", "node_id": "track",
         "channel": 0, "pitch": 60}
    ]
}"#;

#[test]
fn loop_region_wraps_the_transport() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();
    engine.set_schedule(LOOP_SCHEDULE).unwrap();
    engine.set_loop(0.0, 1.0);
    engine.play();

    // Two seconds of audio = four trips around a one-beat loop at 120 bpm.
    let blocks = (2.0 * 44_100.0 / BLOCK as f32).ceil() as usize;
    for _ in 0..blocks {
        pump.block(BLOCK);
    }

    assert!(engine.is_playing(), "loop must not stop the transport");
    assert!(
        engine.current_beat() < 1.0,
        "beat should stay inside the loop, got {}",
        engine.current_beat()
    );
}

#[test]
fn disable_loop_lets_the_arrangement_end() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();
    engine.set_schedule(LOOP_SCHEDULE).unwrap();
    engine.set_loop(0.0, 1.0);
    engine.disable_loop();
    engine.play();

    let blocks = (1.0 * 44_100.0 / BLOCK as f32).ceil() as usize + 2;
    for _ in 0..blocks {
        pump.block(BLOCK);
    }

    // Arrangement length is 0.5 beats; playback stops and rewinds.
    assert!(!engine.is_playing());
    assert_eq!(engine.current_beat(), 0.0);
}

#[test]
fn preview_notes_survive_stop_and_play() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();

    // Empty node id routes to the first track source.
    engine.preview_note_on("", 0, 60, 100);
    let peak = pump.peak_over_blocks(BLOCK, 2);
    assert!(peak > 0.01, "preview note should sound while stopped");

    engine.stop();
    engine.play();
    engine.stop();
    let peak = pump.peak_over_blocks(BLOCK, 4);
    assert!(
        peak > 0.01,
        "preview is independent of the transport, got {peak}"
    );

    engine.preview_note_off("", 0, 60);
    // Skip past the ~33 ms release.
    pump.peak_over_blocks(BLOCK, 6);
    let peak = pump.peak_over_blocks(BLOCK, 2);
    assert!(peak < 1e-3, "explicit note_off silences preview, got {peak}");
}

#[test]
fn preview_all_notes_off_silences_every_source() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();

    engine.preview_note_on("track", 0, 64, 110);
    assert!(pump.peak_over_blocks(BLOCK, 2) > 0.01);

    engine.preview_all_notes_off("");
    pump.peak_over_blocks(BLOCK, 6);
    assert!(pump.peak_over_blocks(BLOCK, 2) < 1e-3);
}

#[test]
fn graph_swap_under_load_keeps_output_bounded() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::sine_mixer_graph("sine1")).unwrap();
    engine
        .set_schedule(
            r#"{
                "events": [
                    {"beat": 0.0, "type": "note_on", "node_id": "sine1",
                     "channel": 0, "pitch": 69, "velocity": 100},
                    {"beat": 8.0, "type": "note_off", "node_id": "sine1",
                     "channel": 0, "pitch": 69}
                ]
            }"#,
        )
        .unwrap();
    engine.play();

    for _ in 0..20 {
        let buffer = pump.block(BLOCK);
        assert!(buffer.iter().all(|s| s.abs() <= 1.0));
    }

    // Install a second graph mid-playback; the very next block must come
    // from it without a pop.
    engine.set_graph(&common::sine_mixer_graph("sine2")).unwrap();
    for _ in 0..20 {
        let buffer = pump.block(BLOCK);
        assert!(buffer.iter().all(|s| s.abs() <= 1.0));
    }

    // Old ids are gone: parameter writes to them are silent no-ops, the
    // new id is addressable.
    engine.set_param("sine1", "gain", 0.2);
    engine.set_param("sine2", "gain", 0.2);
    pump.block(BLOCK);
}

#[test]
fn stop_silences_scheduled_notes() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();
    engine
        .set_schedule(
            r#"{
                "events": [
                    {"beat": 0.0, "type": "note_on", "node_id": "track",
                     "channel": 0, "pitch": 60, "velocity": 100},
                    {"beat": 16.0, "type": "note_off", "node_id": "track",
                     "channel": 0, "pitch": 60}
                ]
            }"#,
        )
        .unwrap();
    engine.play();
    assert!(pump.peak_over_blocks(BLOCK, 4) > 0.01);

    engine.stop();
    pump.peak_over_blocks(BLOCK, 6);
    let peak = pump.peak_over_blocks(BLOCK, 2);
    assert!(peak < 1e-3, "transport stop fires all-notes-off: {peak}");
}

#[test]
fn seek_replays_events_from_the_new_position() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();
    engine
        .set_schedule(
            r#"{
                "events": [
                    {"beat": 4.0, "type": "note_on", "node_id": "track",
                     "channel": 0, "pitch": 72, "velocity": 100},
                    {"beat": 8.0, "type": "note_off", "node_id": "track",
                     "channel": 0, "pitch": 72}
                ]
            }"#,
        )
        .unwrap();
    engine.play();

    // At the start nothing sounds yet.
    assert!(pump.peak_over_blocks(BLOCK, 2) < 1e-6);

    engine.seek(4.0);
    let peak = pump.peak_over_blocks(BLOCK, 4);
    assert!(peak > 0.01, "note at the seek target should fire: {peak}");
}

#[test]
fn new_schedule_length_is_observable_immediately() {
    let (mut engine, _pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();
    assert_eq!(engine.arrangement_length(), 0.0);
    engine.set_schedule(LOOP_SCHEDULE).unwrap();
    assert_eq!(engine.arrangement_length(), 0.5);
}

#[test]
fn position_reports_beat_and_playing_state() {
    let (mut engine, pump) = common::engine_with_pump(EngineConfig::default());
    engine.set_graph(&common::track_sine_mixer_graph()).unwrap();
    engine
        .set_schedule(
            r#"{"events": [
                {"beat": 64.0, "type": "note_off", "node_id": "track",
                 "channel": 0, "pitch": 0}
            ]}"#,
        )
        .unwrap();

    assert!(!engine.is_playing());
    assert_eq!(engine.current_beat(), 0.0);

    engine.play();
    pump.block(BLOCK);
    assert!(engine.is_playing());
    let expected = BLOCK as f64 * (120.0 / 60.0 / 44_100.0);
    assert!((engine.current_beat() - expected).abs() < 1e-9);
}
