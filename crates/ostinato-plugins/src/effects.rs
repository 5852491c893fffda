//! Audio effects: the stereo mixer and a Schroeder-style reverb.

use ostinato_plugin_sdk::{
    ConfigParam, ConfigType, Plugin, PluginBuffers, PluginDescriptor, PortDescriptor, PortRole,
    ProcessContext,
};

/// Sums N stereo input pairs into one stereo output with per-channel gain,
/// a master gain, and a tanh saturator on the mix bus.
///
/// The channel count is set via `configure("channel_count", "N")` before
/// activation; the descriptor is built dynamically from it.
pub struct MixerPlugin {
    channel_count: usize,
}

impl Default for MixerPlugin {
    fn default() -> Self {
        Self { channel_count: 2 }
    }
}

impl Plugin for MixerPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.mixer", "Mixer", "Mixer");
        d.doc =
            "Sums N stereo input pairs into one stereo output with per-channel gain.".to_owned();
        d.author = "builtin".to_owned();

        for i in 0..self.channel_count {
            d.ports.push(
                PortDescriptor::audio_stereo(
                    &format!("audio_in_{i}"),
                    &format!("Input {i}"),
                    PortRole::Input,
                )
                .with_doc(&format!("Stereo input channel {i}")),
            );
            d.ports.push(
                PortDescriptor::control(&format!("gain_{i}"), &format!("Gain {i}"), PortRole::Input)
                    .with_doc(&format!("Gain for input channel {i}"))
                    .with_range(1.0, 0.0, 2.0),
            );
        }

        d.ports.push(
            PortDescriptor::control("master_gain", "Master Gain", PortRole::Input)
                .with_doc("Master output gain")
                .with_range(1.0, 0.0, 2.0),
        );
        d.ports.push(
            PortDescriptor::audio_stereo("audio_out", "Audio Out", PortRole::Output)
                .with_doc("Stereo mix output"),
        );

        d.config_params = vec![ConfigParam::new(
            "channel_count",
            "Channels",
            ConfigType::Integer,
            &self.channel_count.to_string(),
        )];
        d
    }

    fn configure(&mut self, key: &str, value: &str) {
        if key == "channel_count" {
            if let Ok(n) = value.parse::<usize>() {
                if (1..=64).contains(&n) {
                    self.channel_count = n;
                }
            }
        }
    }

    fn process(&mut self, ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        let master = buffers
            .control
            .get("master_gain")
            .map(|c| c.value)
            .unwrap_or(1.0);

        // Gather per-channel gains first; the output borrow below would
        // otherwise block the control lookups.
        let mut gains = [0.0f32; 64];
        for ch in 0..self.channel_count.min(64) {
            gains[ch] = buffers
                .control
                .get(&format!("gain_{ch}"))
                .map(|c| c.value)
                .unwrap_or(1.0)
                * master;
        }

        for ch in 0..self.channel_count.min(64) {
            // AudioPortBuffer is a pair of pool pointers; copying it out
            // lets us borrow the output map entry mutably below. Input and
            // output ports never share a pool buffer.
            let Some(input) = buffers.audio.get(&format!("audio_in_{ch}")).copied() else {
                continue;
            };
            let Some(out) = buffers.audio.get_mut("audio_out") else {
                return;
            };
            let (out_l, out_r) = out.stereo_mut();
            let (in_l, in_r) = (input.left(), input.right());
            let g = gains[ch];
            for i in 0..ctx.block_size {
                out_l[i] += in_l[i] * g;
                out_r[i] += in_r[i] * g;
            }
        }

        if let Some(out) = buffers.audio.get_mut("audio_out") {
            let (out_l, out_r) = out.stereo_mut();
            for i in 0..ctx.block_size {
                out_l[i] = out_l[i].tanh();
                out_r[i] = out_r[i].tanh();
            }
        }
    }
}

const COMB_LENGTHS: [usize; 8] = [
    1116, 1188, 1277, 1356, // left channel
    1139, 1211, 1300, 1379, // right channel, detuned for stereo width
];

const ALLPASS_LENGTHS: [usize; 4] = [556, 441, 579, 464];

#[derive(Debug, Default, Clone)]
struct DelayLine {
    buf: Vec<f32>,
    write_pos: usize,
    filter_state: f32,
}

impl DelayLine {
    fn resize(&mut self, len: usize) {
        self.buf = vec![0.0; len];
        self.write_pos = 0;
        self.filter_state = 0.0;
    }

    /// Comb filter with a one-pole lowpass in the feedback path.
    fn process_comb(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let delayed = self.buf[self.write_pos];
        self.filter_state = delayed * (1.0 - damp) + self.filter_state * damp;
        self.buf[self.write_pos] = input + self.filter_state * feedback;
        self.write_pos = (self.write_pos + 1) % self.buf.len();
        delayed
    }

    fn process_allpass(&mut self, input: f32, feedback: f32) -> f32 {
        let delayed = self.buf[self.write_pos];
        let output = delayed - input;
        self.buf[self.write_pos] = input + delayed * feedback;
        self.write_pos = (self.write_pos + 1) % self.buf.len();
        output
    }
}

/// Schroeder/Freeverb-style stereo reverb: four parallel combs per channel
/// (detuned left vs right) feeding two series allpasses.
pub struct ReverbPlugin {
    combs: Vec<DelayLine>,
    allpasses: Vec<DelayLine>,
}

impl Default for ReverbPlugin {
    fn default() -> Self {
        Self {
            combs: vec![DelayLine::default(); COMB_LENGTHS.len()],
            allpasses: vec![DelayLine::default(); ALLPASS_LENGTHS.len()],
        }
    }
}

impl Plugin for ReverbPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.reverb", "Reverb", "Effect");
        d.doc = "Schroeder/Freeverb-style stereo reverb.".to_owned();
        d.author = "builtin".to_owned();
        d.ports = vec![
            PortDescriptor::audio_stereo("audio_in", "Audio In", PortRole::Input),
            PortDescriptor::audio_stereo("audio_out", "Audio Out", PortRole::Output),
            PortDescriptor::control("room_size", "Room Size", PortRole::Input)
                .with_doc("Comb feedback amount")
                .with_range(0.5, 0.0, 0.98),
            PortDescriptor::control("damping", "Damping", PortRole::Input)
                .with_doc("High-frequency damping in the tail")
                .with_range(0.5, 0.0, 1.0),
            PortDescriptor::control("mix", "Dry/Wet", PortRole::Input)
                .with_doc("0 = dry only, 1 = wet only")
                .with_range(0.3, 0.0, 1.0),
        ];
        d
    }

    fn activate(&mut self, sample_rate: f32, _max_block_size: usize) {
        // Delay lengths are tuned for 44.1 kHz; scale for other rates.
        let scale = sample_rate / 44_100.0;
        for (line, len) in self.combs.iter_mut().zip(COMB_LENGTHS) {
            line.resize(((len as f32 * scale) as usize).max(1));
        }
        for (line, len) in self.allpasses.iter_mut().zip(ALLPASS_LENGTHS) {
            line.resize(((len as f32 * scale) as usize).max(1));
        }
    }

    fn process(&mut self, ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        let room = buffers
            .control
            .get("room_size")
            .map(|c| c.value)
            .unwrap_or(0.5)
            .clamp(0.0, 0.98);
        let damp = buffers
            .control
            .get("damping")
            .map(|c| c.value)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);
        let mix = buffers
            .control
            .get("mix")
            .map(|c| c.value)
            .unwrap_or(0.3)
            .clamp(0.0, 1.0);
        let feedback = 0.7 + room * 0.28;

        let Some(input) = buffers.audio.get("audio_in").copied() else {
            return;
        };
        let Some(out) = buffers.audio.get_mut("audio_out") else {
            return;
        };
        let (in_l, in_r) = (input.left(), input.right());
        let (out_l, out_r) = out.stereo_mut();

        let (combs_l, combs_r) = self.combs.split_at_mut(4);
        let (aps_l, aps_r) = self.allpasses.split_at_mut(2);

        for i in 0..ctx.block_size {
            let dry_l = in_l[i];
            let dry_r = in_r[i];

            let mut wet_l = 0.0;
            for comb in combs_l.iter_mut() {
                wet_l += comb.process_comb(dry_l, feedback, damp);
            }
            let mut wet_r = 0.0;
            for comb in combs_r.iter_mut() {
                wet_r += comb.process_comb(dry_r, feedback, damp);
            }
            wet_l *= 0.25;
            wet_r *= 0.25;

            for ap in aps_l.iter_mut() {
                wet_l = ap.process_allpass(wet_l, 0.5);
            }
            for ap in aps_r.iter_mut() {
                wet_r = ap.process_allpass(wet_r, 0.5);
            }

            out_l[i] = dry_l * (1.0 - mix) + wet_l * mix;
            out_r[i] = dry_r * (1.0 - mix) + wet_r * mix;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_plugin_sdk::{AudioPortBuffer, ControlPortBuffer};

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
    fn mixer_sums_inputs_with_gains() {
        let mut mixer = MixerPlugin::default();
        mixer.configure("channel_count", "2");

        let block = 8;
        let mut in0_l = vec![0.5f32; block];
        let mut in0_r = vec![0.5f32; block];
        let mut in1_l = vec![0.25f32; block];
        let mut in1_r = vec![0.25f32; block];
        let mut out_l = vec![0.0f32; block];
        let mut out_r = vec![0.0f32; block];

        let mut buffers = PluginBuffers::default();
        let mut a = AudioPortBuffer::empty();
        a.bind(in0_l.as_mut_ptr(), in0_r.as_mut_ptr(), block);
        buffers.audio.insert("audio_in_0".to_owned(), a);
        let mut a = AudioPortBuffer::empty();
        a.bind(in1_l.as_mut_ptr(), in1_r.as_mut_ptr(), block);
        buffers.audio.insert("audio_in_1".to_owned(), a);
        let mut a = AudioPortBuffer::empty();
        a.bind(out_l.as_mut_ptr(), out_r.as_mut_ptr(), block);
        buffers.audio.insert("audio_out".to_owned(), a);
        buffers
            .control
            .insert("gain_0".to_owned(), ControlPortBuffer { value: 1.0 });
        buffers
            .control
            .insert("gain_1".to_owned(), ControlPortBuffer { value: 2.0 });
        buffers
            .control
            .insert("master_gain".to_owned(), ControlPortBuffer { value: 1.0 });

        mixer.process(&ctx(block), &mut buffers);

        // 0.5 * 1.0 + 0.25 * 2.0 = 1.0, then tanh.
        let expected = 1.0f32.tanh();
        assert!((out_l[0] - expected).abs() < 1e-6);
        assert!((out_r[block - 1] - expected).abs() < 1e-6);
    }

    #[test]
    fn reverb_produces_a_tail_after_impulse() {
        let mut reverb = ReverbPlugin::default();
        reverb.activate(44_100.0, 512);

        let block = 512;
        let mut in_l = vec![0.0f32; block];
        let mut in_r = vec![0.0f32; block];
        in_l[0] = 1.0;
        in_r[0] = 1.0;
        let mut out_l = vec![0.0f32; block];
        let mut out_r = vec![0.0f32; block];

        let mut run = |in_l: &mut Vec<f32>, in_r: &mut Vec<f32>, out_l: &mut Vec<f32>, out_r: &mut Vec<f32>| {
            let mut buffers = PluginBuffers::default();
            let mut a = AudioPortBuffer::empty();
            a.bind(in_l.as_mut_ptr(), in_r.as_mut_ptr(), block);
            buffers.audio.insert("audio_in".to_owned(), a);
            let mut a = AudioPortBuffer::empty();
            a.bind(out_l.as_mut_ptr(), out_r.as_mut_ptr(), block);
            buffers.audio.insert("audio_out".to_owned(), a);
            buffers
                .control
                .insert("mix".to_owned(), ControlPortBuffer { value: 1.0 });
            reverb.process(&ctx(block), &mut buffers);
        };

        run(&mut in_l, &mut in_r, &mut out_l, &mut out_r);
        // Feed silence; the tail should still ring.
        in_l[0] = 0.0;
        in_r[0] = 0.0;
        for sample in out_l.iter_mut() {
            *sample = 0.0;
        }
        run(&mut in_l, &mut in_r, &mut out_l, &mut out_r);
        let tail: f32 = out_l.iter().map(|s| s.abs()).sum();
        assert!(tail > 0.0, "reverb tail should ring past the impulse block");
    }
}
