//! Tone generators.

use std::collections::HashMap;
use std::f64::consts::TAU;

use ostinato_plugin_sdk::{
    Plugin, PluginBuffers, PluginDescriptor, PortDescriptor, PortRole, ProcessContext,
};

#[derive(Debug, Clone, Copy)]
struct Voice {
    phase: f64,
    freq: f64,
    amp: f32,
    releasing: bool,
    env: f32,
    /// Per-sample decay rate once releasing.
    env_release: f32,
}

impl Voice {
    fn new(freq: f64, amp: f32) -> Self {
        Self {
            phase: 0.0,
            freq,
            amp,
            releasing: false,
            env: 1.0,
            env_release: 0.0,
        }
    }
}

/// Simple polyphonic sine synthesizer with a short release envelope.
pub struct SinePlugin {
    sample_rate: f32,
    // key = channel * 128 + pitch
    voices: HashMap<u32, Voice>,
    dead: Vec<u32>,
}

impl Default for SinePlugin {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            voices: HashMap::new(),
            dead: Vec::new(),
        }
    }
}

impl SinePlugin {
    fn voice_key(channel: u8, pitch: u8) -> u32 {
        channel as u32 * 128 + pitch as u32
    }
}

impl Plugin for SinePlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.sine", "Sine Synth", "Synth");
        d.doc = "Simple polyphonic sine wave synthesizer with release envelope.".to_owned();
        d.author = "builtin".to_owned();
        d.ports = vec![
            PortDescriptor::audio_stereo("audio_out", "Audio Out", PortRole::Output)
                .with_doc("Stereo audio output"),
            PortDescriptor::control("gain", "Gain", PortRole::Input)
                .with_doc("Output volume")
                .with_range(0.15, 0.0, 1.0),
        ];
        d
    }

    fn activate(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.voices.clear();
    }

    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        let freq = 440.0 * 2f64.powf((pitch as f64 - 69.0) / 12.0);
        let amp = velocity as f32 / 127.0;
        self.voices
            .insert(Self::voice_key(channel, pitch), Voice::new(freq, amp));
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        if let Some(voice) = self.voices.get_mut(&Self::voice_key(channel, pitch)) {
            voice.releasing = true;
            voice.env_release = 30.0 / self.sample_rate; // ~33 ms release
        }
    }

    fn all_notes_off(&mut self, channel: Option<u8>) {
        match channel {
            None => self.voices.clear(),
            Some(ch) => self.voices.retain(|key, _| key / 128 != ch as u32),
        }
    }

    fn process(&mut self, ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        let gain = buffers.control.get("gain").map(|c| c.value).unwrap_or(0.15);

        let Some(audio) = buffers.audio.get_mut("audio_out") else {
            return;
        };
        let (left, right) = audio.stereo_mut();

        self.dead.clear();
        for (key, voice) in self.voices.iter_mut() {
            let phase_inc = TAU * voice.freq / self.sample_rate as f64;
            let amp = voice.amp * gain;
            for i in 0..ctx.block_size {
                let env = if voice.releasing {
                    voice.env *= 1.0 - voice.env_release;
                    voice.env
                } else {
                    1.0
                };
                let sample = voice.phase.sin() as f32 * amp * env;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(block: usize) -> ProcessContext {
        ProcessContext {
            block_size: block,
            sample_rate: 44_100.0,
            bpm: 120.0,
            beat_position: 0.0,
            beats_per_sample: 120.0 / 60.0 / 44_100.0,
        }
    }

    fn stereo_buffers(left: &mut Vec<f32>, right: &mut Vec<f32>) -> PluginBuffers {
        let mut buffers = PluginBuffers::default();
        let mut audio = ostinato_plugin_sdk::AudioPortBuffer::empty();
        audio.bind(left.as_mut_ptr(), right.as_mut_ptr(), left.len());
        buffers.audio.insert("audio_out".to_owned(), audio);
        buffers
    }

    #[test]
    fn held_note_produces_audio_and_release_decays() {
        let mut synth = SinePlugin::default();
        synth.activate(44_100.0, 256);
        synth.note_on(0, 69, 100);

        let mut left = vec![0.0f32; 256];
        let mut right = vec![0.0f32; 256];
        let mut buffers = stereo_buffers(&mut left, &mut right);
        synth.process(&ctx(256), &mut buffers);

        let peak = left.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.01, "held note should be audible, peak {peak}");

        synth.note_off(0, 69);
        // Run enough blocks for the ~33 ms release to die out.
        for _ in 0..20 {
            left.fill(0.0);
            right.fill(0.0);
            let mut buffers = stereo_buffers(&mut left, &mut right);
            synth.process(&ctx(256), &mut buffers);
        }
        let tail = left.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail < 1e-3, "released note should decay, tail {tail}");
        assert!(synth.voices.is_empty());
    }

    #[test]
    fn all_notes_off_is_channel_selective() {
        let mut synth = SinePlugin::default();
        synth.activate(44_100.0, 64);
        synth.note_on(0, 60, 100);
        synth.note_on(1, 64, 100);
        synth.all_notes_off(Some(0));
        assert_eq!(synth.voices.len(), 1);
        synth.all_notes_off(None);
        assert!(synth.voices.is_empty());
    }
}
