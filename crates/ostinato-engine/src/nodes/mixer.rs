//! Built-in mixer: sums N stereo input pairs into one stereo output with
//! per-channel and master gain, saturated with tanh on the way out.

use ostinato_plugin_sdk::ProcessContext;

use crate::node::{PortBuffer, PortDecl};

pub struct MixerNode {
    input_count: usize,
    channel_gain: Vec<f32>,
    master_gain: f32,
}

impl MixerNode {
    pub fn new(input_count: usize) -> Self {
        let input_count = input_count.max(1);
        Self {
            input_count,
            channel_gain: vec![1.0; input_count],
            master_gain: 1.0,
        }
    }

    pub fn declare_ports(&self) -> Vec<PortDecl> {
        let mut ports = Vec::with_capacity(self.input_count * 2 + 2);
        for i in 0..self.input_count {
            ports.push(PortDecl::audio_in(&format!("audio_in_L_{i}")));
            ports.push(PortDecl::audio_in(&format!("audio_in_R_{i}")));
        }
        ports.push(PortDecl::audio_out("audio_out_L"));
        ports.push(PortDecl::audio_out("audio_out_R"));
        ports
    }

    /// `"master_gain"` or `"gain_<n>"`.
    pub fn set_param(&mut self, name: &str, value: f32) {
        if name == "master_gain" {
            self.master_gain = value.max(0.0);
            return;
        }
        if let Some(index) = name.strip_prefix("gain_") {
            if let Ok(n) = index.parse::<usize>() {
                if n < self.input_count {
                    self.channel_gain[n] = value.max(0.0);
                }
            }
        }
    }

    pub fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &[PortBuffer],
        outputs: &mut [PortBuffer],
    ) {
        if outputs.len() < 2 {
            return;
        }
        let (head, tail) = outputs.split_at_mut(1);
        let out_l = head[0].audio_mut();
        let out_r = tail[0].audio_mut();
        out_l[..ctx.block_size].fill(0.0);
        out_r[..ctx.block_size].fill(0.0);

        for ch in 0..self.input_count {
            let Some(in_l) = inputs.get(ch * 2) else {
                break;
            };
            let Some(in_r) = inputs.get(ch * 2 + 1) else {
                break;
            };
            let gain = self.channel_gain[ch] * self.master_gain;
            let in_l = in_l.audio();
            let in_r = in_r.audio();
            for i in 0..ctx.block_size {
                out_l[i] += in_l[i] * gain;
                out_r[i] += in_r[i] * gain;
            }
        }

        for i in 0..ctx.block_size {
            out_l[i] = out_l[i].tanh();
            out_r[i] = out_r[i].tanh();
        }
    }
}
