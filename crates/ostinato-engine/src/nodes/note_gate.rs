//! Note gate: converts note events into a control signal.

use std::collections::HashMap;

use ostinato_plugin_sdk::ProcessContext;

use crate::node::{PortBuffer, PortDecl};

const MODE_GATE: i32 = 0;
const MODE_VELOCITY: i32 = 1;
const MODE_PITCH: i32 = 2;
const MODE_NOTE_COUNT: i32 = 3;

/// Watches a pitch band and produces one control value per block.
///
/// Modes: 0 Gate (1 while any in-band note held), 1 Velocity (highest
/// active velocity), 2 Pitch (highest active pitch mapped across the band),
/// 3 NoteCount (held notes over band width).
pub struct NoteGateNode {
    pitch_lo: i32,
    pitch_hi: i32,
    mode: i32,
    current_value: f32,
    // key = channel * 128 + pitch, value = velocity
    active: HashMap<u32, u8>,
}

impl NoteGateNode {
    pub fn new(pitch_lo: i32, pitch_hi: i32, mode: i32) -> Self {
        Self {
            pitch_lo: pitch_lo.clamp(0, 127),
            pitch_hi: pitch_hi.clamp(0, 127),
            mode: mode.clamp(0, 3),
            current_value: 0.0,
            active: HashMap::new(),
        }
    }

    pub fn declare_ports(&self) -> Vec<PortDecl> {
        vec![PortDecl::control_out("control_out").with_range(0.0, 0.0, 1.0)]
    }

    fn in_band(&self, pitch: u8) -> bool {
        (pitch as i32) >= self.pitch_lo && (pitch as i32) <= self.pitch_hi
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        if !self.in_band(pitch) {
            return;
        }
        self.active
            .insert(channel as u32 * 128 + pitch as u32, velocity);
        self.recompute();
    }

    pub fn note_off(&mut self, channel: u8, pitch: u8) {
        if !self.in_band(pitch) {
            return;
        }
        self.active.remove(&(channel as u32 * 128 + pitch as u32));
        self.recompute();
    }

    pub fn all_notes_off(&mut self, channel: Option<u8>) {
        match channel {
            None => self.active.clear(),
            Some(ch) => self.active.retain(|key, _| key / 128 != ch as u32),
        }
        self.recompute();
    }

    pub fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "pitch_lo" => self.pitch_lo = (value as i32).clamp(0, 127),
            "pitch_hi" => self.pitch_hi = (value as i32).clamp(0, 127),
            "mode" => self.mode = (value as i32).clamp(0, 3),
            _ => {}
        }
        self.recompute();
    }

    pub fn process(
        &mut self,
        _ctx: &ProcessContext,
        _inputs: &[PortBuffer],
        outputs: &mut [PortBuffer],
    ) {
        if let Some(out) = outputs.first_mut() {
            out.control = self.current_value;
        }
    }

    fn recompute(&mut self) {
        if self.active.is_empty() {
            self.current_value = 0.0;
            return;
        }
        self.current_value = match self.mode {
            MODE_GATE => 1.0,
            MODE_VELOCITY => {
                let max_vel = self.active.values().copied().max().unwrap_or(0);
                max_vel as f32 / 127.0
            }
            MODE_PITCH => {
                let band = self.pitch_hi - self.pitch_lo;
                if band <= 0 {
                    0.0
                } else {
                    let highest = self
                        .active
                        .keys()
                        .map(|key| (key % 128) as i32)
                        .max()
                        .unwrap_or(0);
                    (((highest - self.pitch_lo) as f32) / band as f32).clamp(0.0, 1.0)
                }
            }
            MODE_NOTE_COUNT => {
                let band = self.pitch_hi - self.pitch_lo + 1;
                if band <= 0 {
                    0.0
                } else {
                    (self.active.len() as f32 / band as f32).min(1.0)
                }
            }
            _ => 0.0,
        };
    }
}
