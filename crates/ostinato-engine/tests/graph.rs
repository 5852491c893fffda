mod common;

use ostinato_engine::{Graph, GraphError, GraphEvent};
use ostinato_plugin_sdk::ProcessContext;

fn ctx(block: usize) -> ProcessContext {
    ProcessContext {
        block_size: block,
        sample_rate: 44_100.0,
        bpm: 120.0,
        beat_position: 0.0,
        beats_per_sample: 120.0 / 60.0 / 44_100.0,
    }
}

#[test]
fn builds_and_runs_the_canonical_chain() {
    common::register_plugins();
    let mut graph = Graph::from_json(&common::sine_mixer_graph("sine1")).unwrap();
    graph.activate(44_100.0, 512).unwrap();

    graph.deliver(
        "sine1",
        GraphEvent::NoteOn {
            channel: 0,
            pitch: 69,
            velocity: 100,
        },
    );
    graph.process(&ctx(512));

    let mut left = vec![0.0f32; 512];
    let mut right = vec![0.0f32; 512];
    assert!(graph.copy_output(&mut left, &mut right));
    let peak = left.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.01, "sine through mixer should be audible");
}

#[test]
fn unconnected_graph_outputs_silence() {
    common::register_plugins();
    let json = r#"{
        "nodes": [{"id": "mixer", "type": "builtin.mixer", "channel_count": 2}],
        "connections": []
    }"#;
    let mut graph = Graph::from_json(json).unwrap();
    graph.activate(44_100.0, 256).unwrap();
    graph.process(&ctx(256));

    let mut left = vec![1.0f32; 256];
    let mut right = vec![1.0f32; 256];
    assert!(graph.copy_output(&mut left, &mut right));
    assert!(left.iter().all(|s| *s == 0.0));
    assert!(right.iter().all(|s| *s == 0.0));
}

#[test]
fn cycle_falls_back_to_declaration_order() {
    common::register_plugins();
    // Two mixers feeding each other: not a DAG.
    let json = r#"{
        "nodes": [
            {"id": "mixer", "type": "builtin.mixer", "channel_count": 2},
            {"id": "b", "type": "builtin.mixer", "channel_count": 2}
        ],
        "connections": [
            {"from_node": "mixer", "from_port": "audio_out_L",
             "to_node": "b", "to_port": "audio_in_0_L"},
            {"from_node": "b", "from_port": "audio_out_L",
             "to_node": "mixer", "to_port": "audio_in_0_L"}
        ]
    }"#;
    let mut graph = Graph::from_json(json).unwrap();
    // Non-fatal degradation: activation succeeds.
    graph.activate(44_100.0, 128).unwrap();
    assert_eq!(graph.eval_order(), vec!["mixer".to_owned(), "b".to_owned()]);
    graph.process(&ctx(128));

    let mut left = vec![0.0f32; 128];
    let mut right = vec![0.0f32; 128];
    assert!(graph.copy_output(&mut left, &mut right));
}

#[test]
fn duplicate_input_connection_is_a_build_error() {
    common::register_plugins();
    let json = r#"{
        "nodes": [
            {"id": "a", "type": "builtin.sine"},
            {"id": "b", "type": "builtin.sine"},
            {"id": "mixer", "type": "builtin.mixer", "channel_count": 2}
        ],
        "connections": [
            {"from_node": "a", "from_port": "audio_out_L",
             "to_node": "mixer", "to_port": "audio_in_0_L"},
            {"from_node": "b", "from_port": "audio_out_L",
             "to_node": "mixer", "to_port": "audio_in_0_L"}
        ]
    }"#;
    let mut graph = Graph::from_json(json).unwrap();
    let err = graph.activate(44_100.0, 128).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateInput { .. }));
}

#[test]
fn unknown_node_type_is_a_build_error() {
    common::register_plugins();
    let json = r#"{"nodes": [{"id": "x", "type": "does.not.exist"}]}"#;
    let err = Graph::from_json(json).unwrap_err();
    assert!(matches!(err, GraphError::NodeBuild { .. }));
}

#[test]
fn events_to_unknown_nodes_are_silently_dropped() {
    common::register_plugins();
    let mut graph = Graph::from_json(&common::sine_mixer_graph("sine1")).unwrap();
    graph.activate(44_100.0, 128).unwrap();
    // Stale schedule entry: must not panic or halt.
    graph.deliver(
        "gone",
        GraphEvent::NoteOn {
            channel: 0,
            pitch: 60,
            velocity: 100,
        },
    );
    graph.process(&ctx(128));
}

#[test]
fn set_param_to_unknown_node_or_port_is_a_no_op() {
    common::register_plugins();
    let mut graph = Graph::from_json(&common::sine_mixer_graph("sine1")).unwrap();
    graph.activate(44_100.0, 128).unwrap();
    graph.set_param("missing", "gain", 0.5);
    graph.set_param("sine1", "missing_param", 0.5);
}

#[test]
fn track_source_fans_scheduled_events_to_downstream() {
    common::register_plugins();
    let mut graph = Graph::from_json(&common::track_sine_mixer_graph()).unwrap();
    graph.activate(44_100.0, 512).unwrap();

    graph.deliver(
        "track",
        GraphEvent::NoteOn {
            channel: 0,
            pitch: 60,
            velocity: 100,
        },
    );
    graph.process(&ctx(512));

    let mut left = vec![0.0f32; 512];
    let mut right = vec![0.0f32; 512];
    assert!(graph.copy_output(&mut left, &mut right));
    let peak = left.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak > 0.01, "fan-out should reach the synth");
}

#[test]
fn adapter_event_outputs_route_within_the_same_block() {
    common::register_plugins();
    // Arpeggiator held note -> events_out -> sine, all in one block.
    let json = r#"{
        "bpm": 120.0,
        "nodes": [
            {"id": "arp", "type": "builtin.arpeggiator"},
            {"id": "voice", "type": "builtin.sine"},
            {"id": "mixer", "type": "builtin.mixer", "channel_count": 2}
        ],
        "connections": [
            {"from_node": "arp", "from_port": "events_out",
             "to_node": "voice", "to_port": "events_in"},
            {"from_node": "voice", "from_port": "audio_out_L",
             "to_node": "mixer", "to_port": "audio_in_0_L"},
            {"from_node": "voice", "from_port": "audio_out_R",
             "to_node": "mixer", "to_port": "audio_in_0_R"}
        ]
    }"#;
    let mut graph = Graph::from_json(json).unwrap();
    graph.activate(44_100.0, 2048).unwrap();

    graph.deliver(
        "arp",
        GraphEvent::NoteOn {
            channel: 0,
            pitch: 60,
            velocity: 100,
        },
    );
    graph.process(&ctx(2048));

    let mut left = vec![0.0f32; 2048];
    let mut right = vec![0.0f32; 2048];
    assert!(graph.copy_output(&mut left, &mut right));
    let peak = left.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(
        peak > 0.01,
        "arpeggiated note should reach the synth this block"
    );
}

#[test]
fn control_flows_through_graph_connections() {
    common::register_plugins();
    // note_gate -> control_monitor: dispatching a note raises the gate,
    // and the monitor sees the value through the graph connection.
    let json = r#"{
        "nodes": [
            {"id": "gate", "type": "note_gate", "pitch_lo": 0, "pitch_hi": 127, "gate_mode": 0},
            {"id": "mon", "type": "builtin.control_monitor"}
        ],
        "connections": [
            {"from_node": "gate", "from_port": "control_out",
             "to_node": "mon", "to_port": "control_in"}
        ]
    }"#;
    let mut graph = Graph::from_json(json).unwrap();
    graph.activate(44_100.0, 128).unwrap();

    graph.deliver(
        "gate",
        GraphEvent::NoteOn {
            channel: 0,
            pitch: 64,
            velocity: 100,
        },
    );
    graph.process(&ctx(128));
    assert_eq!(graph.read_monitor("mon", "latest").unwrap(), 1.0);

    graph.deliver(
        "gate",
        GraphEvent::NoteOff {
            channel: 0,
            pitch: 64,
        },
    );
    graph.process(&ctx(128));
    assert_eq!(graph.read_monitor("mon", "latest").unwrap(), 0.0);
}

#[test]
fn monitor_ports_are_not_routable() {
    common::register_plugins();
    // gate feeds mon's control input; a second connection tries to route
    // mon's Monitor-role "latest" port onward into sink. Monitor ports are
    // control-thread readbacks only, so that connection is ignored: it
    // must neither wire a buffer nor mark sink's input as connected.
    let json = r#"{
        "nodes": [
            {"id": "gate", "type": "note_gate", "pitch_lo": 0, "pitch_hi": 127, "gate_mode": 0},
            {"id": "mon", "type": "builtin.control_monitor"},
            {"id": "sink", "type": "builtin.control_monitor"}
        ],
        "connections": [
            {"from_node": "gate", "from_port": "control_out",
             "to_node": "mon", "to_port": "control_in"},
            {"from_node": "mon", "from_port": "latest",
             "to_node": "sink", "to_port": "control_in"}
        ]
    }"#;
    let mut graph = Graph::from_json(json).unwrap();
    graph.activate(44_100.0, 128).unwrap();

    graph.deliver(
        "gate",
        GraphEvent::NoteOn {
            channel: 0,
            pitch: 64,
            velocity: 100,
        },
    );
    graph.process(&ctx(128));
    graph.process(&ctx(128));

    // The legitimate connection works...
    assert_eq!(graph.read_monitor("mon", "latest").unwrap(), 1.0);
    // ...but the monitor value never flows through the graph.
    assert_eq!(graph.read_monitor("sink", "latest").unwrap(), 0.0);
    assert_eq!(graph.read_monitor("sink", "max").unwrap(), 0.0);
}

#[test]
fn set_node_config_reports_unsupported_keys() {
    common::register_plugins();
    let mut graph = Graph::from_json(&common::sine_mixer_graph("sine1")).unwrap();
    graph.activate(44_100.0, 128).unwrap();

    let ok = graph.set_node_config("mixer", &serde_json::json!({"master_gain": 0.5}));
    assert!(ok.is_ok());

    let err = graph
        .set_node_config("mixer", &serde_json::json!({"channel_count": 4}))
        .unwrap_err();
    assert!(err.to_string().contains("set_graph"));

    let err = graph
        .set_node_config("missing", &serde_json::json!({}))
        .unwrap_err();
    assert!(err.to_string().contains("missing"));
}
