//! Shared test helpers: a manually pumped stream backend and graph JSON
//! builders.
#![allow(dead_code)] // each test binary uses a different subset

use std::sync::{Arc, Once};

use parking_lot::Mutex;

use ostinato_engine::{AudioBackend, AudioEngine, EngineConfig, StreamConfig};
use ostinato_rt::CallbackHandle;

/// Backend that hands the callback to the test instead of a sound card.
/// The test pumps blocks itself, standing in for the audio thread.
pub struct ManualBackend {
    handle: Arc<Mutex<Option<CallbackHandle>>>,
}

impl ManualBackend {
    pub fn new() -> (Self, Pump) {
        let handle = Arc::new(Mutex::new(None));
        (
            Self {
                handle: handle.clone(),
            },
            Pump { handle },
        )
    }
}

impl AudioBackend for ManualBackend {
    fn start(&mut self, _config: &StreamConfig, callback: CallbackHandle) -> anyhow::Result<()> {
        *self.handle.lock() = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        *self.handle.lock() = None;
    }
}

pub struct Pump {
    handle: Arc<Mutex<Option<CallbackHandle>>>,
}

impl Pump {
    /// Render one block of `frames`, returning interleaved stereo samples.
    pub fn block(&self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0f32; frames * 2];
        let handle = self.handle.lock().clone().expect("stream not open");
        handle.render(&mut buffer, frames);
        buffer
    }

    /// Render `count` blocks and return the peak absolute sample seen.
    pub fn peak_over_blocks(&self, frames: usize, count: usize) -> f32 {
        let mut peak = 0.0f32;
        for _ in 0..count {
            let buffer = self.block(frames);
            for sample in buffer {
                peak = peak.max(sample.abs());
            }
        }
        peak
    }
}

pub fn register_plugins() {
    static ONCE: Once = Once::new();
    ONCE.call_once(ostinato_plugins::register_builtin_plugins);
}

pub fn engine_with_pump(cfg: EngineConfig) -> (AudioEngine, Pump) {
    register_plugins();
    let (backend, pump) = ManualBackend::new();
    let mut engine = AudioEngine::with_backend(cfg, Box::new(backend));
    engine.open().expect("open stream");
    (engine, pump)
}

/// Plugin-backed sine -> mixer chain, the canonical test graph.
pub fn sine_mixer_graph(sine_id: &str) -> String {
    format!(
        r#"{{
            "bpm": 120.0,
            "nodes": [
                {{"id": "{sine_id}", "type": "builtin.sine"}},
                {{"id": "mixer", "type": "builtin.mixer", "channel_count": 2}}
            ],
            "connections": [
                {{"from_node": "{sine_id}", "from_port": "audio_out_L",
                  "to_node": "mixer", "to_port": "audio_in_0_L"}},
                {{"from_node": "{sine_id}", "from_port": "audio_out_R",
                  "to_node": "mixer", "to_port": "audio_in_0_R"}}
            ]
        }}"#
    )
}

/// Same chain fronted by a track source feeding the sine.
pub fn track_sine_mixer_graph() -> String {
    r#"{
        "bpm": 120.0,
        "nodes": [
            {"id": "track", "type": "track_source"},
            {"id": "sine1", "type": "builtin.sine"},
            {"id": "mixer", "type": "builtin.mixer", "channel_count": 2}
        ],
        "connections": [
            {"from_node": "track", "from_port": "events",
             "to_node": "sine1", "to_port": "events_in"},
            {"from_node": "sine1", "from_port": "audio_out_L",
             "to_node": "mixer", "to_port": "audio_in_0_L"},
            {"from_node": "sine1", "from_port": "audio_out_R",
             "to_node": "mixer", "to_port": "audio_in_0_R"}
        ]
    }"#
    .to_owned()
}
