//! Built-in sine fallback synth. The plugin registry's `builtin.sine` is
//! the primary path; this node keeps bare `"sine"` graphs playable without
//! any registry at all.

use std::collections::HashMap;
use std::f64::consts::TAU;

use ostinato_plugin_sdk::ProcessContext;

use crate::node::{PortBuffer, PortDecl};

#[derive(Debug, Clone, Copy)]
struct Voice {
    phase: f64,
    freq: f64,
    amp: f32,
    releasing: bool,
    env: f32,
    env_release: f32,
}

pub struct SineNode {
    sample_rate: f32,
    gain: f32,
    // key = channel * 128 + pitch
    voices: HashMap<u32, Voice>,
    dead: Vec<u32>,
}

impl SineNode {
    pub fn new() -> Self {
        Self {
            sample_rate: 44_100.0,
            gain: 0.15,
            voices: HashMap::new(),
            dead: Vec::new(),
        }
    }

    pub fn declare_ports(&self) -> Vec<PortDecl> {
        vec![
            PortDecl::audio_out("audio_out_L"),
            PortDecl::audio_out("audio_out_R"),
        ]
    }

    pub fn activate(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.voices.clear();
    }

    pub fn set_param(&mut self, name: &str, value: f32) {
        if name == "gain" {
            self.gain = value.clamp(0.0, 1.0);
        }
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        let key = channel as u32 * 128 + pitch as u32;
        self.voices.insert(
            key,
            Voice {
                phase: 0.0,
                freq: 440.0 * 2f64.powf((pitch as f64 - 69.0) / 12.0),
                amp: velocity as f32 / 127.0 * self.gain,
                releasing: false,
                env: 1.0,
                env_release: 0.0,
            },
        );
    }

    pub fn note_off(&mut self, channel: u8, pitch: u8) {
        let key = channel as u32 * 128 + pitch as u32;
        if let Some(voice) = self.voices.get_mut(&key) {
            voice.releasing = true;
            voice.env_release = 30.0 / self.sample_rate;
        }
    }

    pub fn all_notes_off(&mut self, channel: Option<u8>) {
        match channel {
            None => self.voices.clear(),
            Some(ch) => self.voices.retain(|key, _| key / 128 != ch as u32),
        }
    }

    pub fn process(
        &mut self,
        ctx: &ProcessContext,
        _inputs: &[PortBuffer],
        outputs: &mut [PortBuffer],
    ) {
        if outputs.len() < 2 {
            return;
        }
        let (head, tail) = outputs.split_at_mut(1);
        let left = head[0].audio_mut();
        let right = tail[0].audio_mut();
        left[..ctx.block_size].fill(0.0);
        right[..ctx.block_size].fill(0.0);

        self.dead.clear();
        for (key, voice) in self.voices.iter_mut() {
            let phase_inc = TAU * voice.freq / self.sample_rate as f64;
            for i in 0..ctx.block_size {
                let env = if voice.releasing {
                    voice.env *= 1.0 - voice.env_release;
                    voice.env
                } else {
                    1.0
                };
                let sample = voice.phase.sin() as f32 * voice.amp * env;
                left[i] += sample;
                right[i] += sample;
                voice.phase += phase_inc;
                if voice.phase > TAU {
                    voice.phase -= TAU;
                }
            }
            if voice.releasing && voice.env < 1e-4 {
                self.dead.push(*key);
            }
        }
        for key in &self.dead {
            self.voices.remove(key);
        }

        for i in 0..ctx.block_size {
            left[i] = left[i].tanh();
            right[i] = right[i].tanh();
        }
    }
}
