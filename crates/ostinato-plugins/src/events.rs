//! Event-domain plugins: the arpeggiator and the note gate.

use std::collections::HashMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use ostinato_plugin_sdk::{
    ControlHint, MidiEvent, Plugin, PluginBuffers, PluginDescriptor, PortDescriptor, PortRole,
    ProcessContext,
};

// Pattern 0 is "Up": the sorted sequence played forward.
const PATTERN_DOWN: u8 = 1;
const PATTERN_UP_DOWN: u8 = 2;
const PATTERN_RANDOM: u8 = 3;
const PATTERN_AS_PLAYED: u8 = 4;

#[derive(Debug, Clone, Copy)]
struct HeldNote {
    channel: u8,
    pitch: u8,
    velocity: u8,
}

/// Tempo-synced arpeggiator. Receives held notes via the note hooks, cycles
/// through them in the selected pattern, and emits arpeggiated notes on the
/// `events_out` port. Step boundaries are quantised to the beat grid so the
/// pattern stays locked to the transport.
pub struct ArpeggiatorPlugin {
    held: Vec<HeldNote>,
    /// Notes we have emitted a note-on for, with the beat the matching
    /// note-off is due. (channel, pitch, off_beat)
    sounding: Vec<(u8, u8, f64)>,
    step_index: usize,
    /// Beat position of the next step boundary, or None when idle.
    next_step_beat: Option<f64>,
    rng: SmallRng,
    scratch: Vec<HeldNote>,
}

impl Default for ArpeggiatorPlugin {
    fn default() -> Self {
        Self {
            held: Vec::new(),
            sounding: Vec::new(),
            step_index: 0,
            next_step_beat: None,
            rng: SmallRng::seed_from_u64(0x0511_AD05),
            scratch: Vec::new(),
        }
    }
}

impl ArpeggiatorPlugin {
    fn control(buffers: &PluginBuffers, id: &str, fallback: f32) -> f32 {
        buffers.control.get(id).map(|c| c.value).unwrap_or(fallback)
    }

    /// The note sequence for the current pattern and octave range.
    fn build_sequence(&mut self, pattern: u8, octaves: u32) {
        self.scratch.clear();
        if self.held.is_empty() {
            return;
        }

        let mut base = self.held.clone();
        match pattern {
            PATTERN_AS_PLAYED => {}
            _ => base.sort_unstable_by_key(|n| n.pitch),
        }

        for octave in 0..octaves {
            for note in &base {
                let shifted = note.pitch as u32 + octave * 12;
                if shifted <= 127 {
                    self.scratch.push(HeldNote {
                        channel: note.channel,
                        pitch: shifted as u8,
                        velocity: note.velocity,
                    });
                }
            }
        }
        if pattern == PATTERN_DOWN {
            self.scratch.reverse();
        }
    }
}

impl Plugin for ArpeggiatorPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.arpeggiator", "Arpeggiator", "EventEffect");
        d.doc = "Tempo-synced arpeggiator over the currently held notes.".to_owned();
        d.author = "builtin".to_owned();
        d.ports = vec![
            PortDescriptor::event("events_in", "Events In", PortRole::Input)
                .with_doc("MIDI input (held notes)"),
            PortDescriptor::event("events_out", "Events Out", PortRole::Output)
                .with_doc("Arpeggiated MIDI output"),
            PortDescriptor::control("pattern", "Pattern", PortRole::Input)
                .with_hint(ControlHint::Categorical)
                .with_range(0.0, 0.0, 4.0)
                .with_step(1.0)
                .with_choices(&["Up", "Down", "Up-Down", "Random", "As Played"]),
            PortDescriptor::control("rate", "Rate (beats)", PortRole::Input)
                .with_doc("Step length in beats; 0.25 = sixteenth at the current tempo")
                .with_range(0.25, 0.0625, 4.0),
            PortDescriptor::control("gate", "Gate", PortRole::Input)
                .with_doc("Note length as a fraction of the step")
                .with_range(0.8, 0.05, 1.0),
            PortDescriptor::control("octaves", "Octaves", PortRole::Input)
                .with_hint(ControlHint::Integer)
                .with_range(1.0, 1.0, 4.0)
                .with_step(1.0),
            PortDescriptor::control("velocity", "Velocity", PortRole::Input)
                .with_doc("Output velocity; 0 = use the held note's velocity")
                .with_hint(ControlHint::Integer)
                .with_range(0.0, 0.0, 127.0)
                .with_step(1.0),
        ];
        d
    }

    fn activate(&mut self, _sample_rate: f32, _max_block_size: usize) {
        self.held.clear();
        self.sounding.clear();
        self.step_index = 0;
        self.next_step_beat = None;
    }

    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.held.retain(|n| n.pitch != pitch || n.channel != channel);
        self.held.push(HeldNote {
            channel,
            pitch,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        self.held
            .retain(|n| n.pitch != pitch || n.channel != channel);
        if self.held.is_empty() {
            self.step_index = 0;
            self.next_step_beat = None;
        }
    }

    fn all_notes_off(&mut self, channel: Option<u8>) {
        match channel {
            None => self.held.clear(),
            Some(ch) => self.held.retain(|n| n.channel != ch),
        }
        if self.held.is_empty() {
            self.step_index = 0;
            self.next_step_beat = None;
        }
    }

    fn process(&mut self, ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        let pattern = Self::control(buffers, "pattern", 0.0) as u8;
        let rate = Self::control(buffers, "rate", 0.25).max(0.0625) as f64;
        let gate = Self::control(buffers, "gate", 0.8).clamp(0.05, 1.0) as f64;
        let octaves = (Self::control(buffers, "octaves", 1.0) as u32).clamp(1, 4);
        let fixed_velocity = Self::control(buffers, "velocity", 0.0) as u8;

        let block_start = ctx.beat_position;
        let block_end = block_start + ctx.beats_per_sample * ctx.block_size as f64;

        self.build_sequence(pattern, octaves);
        let sequence_len = self.scratch.len();

        // Collect this block's emissions before borrowing the output port.
        let mut emitted: Vec<MidiEvent> = Vec::new();

        // Note-offs due this block.
        let mut idx = 0;
        while idx < self.sounding.len() {
            let (channel, pitch, off_beat) = self.sounding[idx];
            if off_beat < block_end {
                let frame = ((off_beat - block_start) / ctx.beats_per_sample)
                    .max(0.0)
                    .min(ctx.block_size as f64 - 1.0) as u32;
                let mut event = MidiEvent::note_off(channel, pitch);
                event.frame = frame;
                emitted.push(event);
                self.sounding.swap_remove(idx);
            } else {
                idx += 1;
            }
        }

        if sequence_len > 0 {
            // Start stepping on the next grid line after the first note.
            let mut step_beat = self
                .next_step_beat
                .unwrap_or_else(|| (block_start / rate).ceil() * rate);
            if self.next_step_beat.is_none() && step_beat < block_start {
                step_beat = block_start;
            }

            while step_beat < block_end {
                let pick = match pattern {
                    PATTERN_RANDOM => self.rng.gen_range(0..sequence_len),
                    PATTERN_UP_DOWN if sequence_len > 1 => {
                        let pos = self.step_index % (2 * sequence_len - 2);
                        if pos < sequence_len {
                            pos
                        } else {
                            2 * sequence_len - 2 - pos
                        }
                    }
                    _ => self.step_index % sequence_len,
                };
                let step = self.scratch[pick];
                let velocity = if fixed_velocity > 0 {
                    fixed_velocity
                } else {
                    step.velocity
                };

                let frame = ((step_beat - block_start) / ctx.beats_per_sample)
                    .max(0.0)
                    .min(ctx.block_size as f64 - 1.0) as u32;
                let mut event = MidiEvent::note_on(step.channel, step.pitch, velocity);
                event.frame = frame;
                emitted.push(event);
                self.sounding
                    .push((step.channel, step.pitch, step_beat + rate * gate));

                self.step_index += 1;
                step_beat += rate;
            }
            self.next_step_beat = Some(step_beat);
        }

        if let Some(out) = buffers.events.get_mut("events_out") {
            for event in emitted {
                out.push(event);
            }
        }
    }
}

const MODE_GATE: u8 = 0;
const MODE_VELOCITY: u8 = 1;
const MODE_PITCH: u8 = 2;
const MODE_NOTE_COUNT: u8 = 3;

/// Converts MIDI note events into a control signal.
///
/// Modes: Gate (1 while any in-band note held), Velocity (normalised
/// velocity), Pitch (position within the band), NoteCount (held notes over
/// band width).
pub struct NoteGatePlugin {
    mode: u8,
    pitch_lo: u8,
    pitch_hi: u8,
    current_value: f32,
    // key = channel * 128 + pitch, value = velocity
    active: HashMap<u32, u8>,
}

impl Default for NoteGatePlugin {
    fn default() -> Self {
        Self {
            mode: MODE_GATE,
            pitch_lo: 0,
            pitch_hi: 127,
            current_value: 0.0,
            active: HashMap::new(),
        }
    }
}

impl NoteGatePlugin {
    fn in_band(&self, pitch: u8) -> bool {
        pitch >= self.pitch_lo && pitch <= self.pitch_hi
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
                let band = self.pitch_hi as i32 - self.pitch_lo as i32;
                if band <= 0 {
                    0.0
                } else {
                    let highest = self
                        .active
                        .keys()
                        .map(|key| (key % 128) as i32)
                        .max()
                        .unwrap_or(0);
                    ((highest - self.pitch_lo as i32) as f32 / band as f32).clamp(0.0, 1.0)
                }
            }
            MODE_NOTE_COUNT => {
                let band = self.pitch_hi as i32 - self.pitch_lo as i32 + 1;
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

impl Plugin for NoteGatePlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.note_gate", "Note Gate", "Utility");
        d.doc = "Converts MIDI note events into a control signal. Modes: Gate, Velocity, Pitch, NoteCount.".to_owned();
        d.author = "builtin".to_owned();
        d.ports = vec![
            PortDescriptor::event("event_in", "MIDI In", PortRole::Input)
                .with_doc("Note events to convert"),
            PortDescriptor::control("control_out", "Control Out", PortRole::Output)
                .with_range(0.0, 0.0, 1.0),
            PortDescriptor::control("mode", "Mode", PortRole::Input)
                .with_hint(ControlHint::Categorical)
                .with_range(0.0, 0.0, 3.0)
                .with_step(1.0)
                .with_choices(&["Gate", "Velocity", "Pitch", "NoteCount"]),
            PortDescriptor::control("pitch_lo", "Pitch Low", PortRole::Input)
                .with_hint(ControlHint::Integer)
                .with_range(0.0, 0.0, 127.0)
                .with_step(1.0),
            PortDescriptor::control("pitch_hi", "Pitch High", PortRole::Input)
                .with_hint(ControlHint::Integer)
                .with_range(127.0, 0.0, 127.0)
                .with_step(1.0),
        ];
        d
    }

    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        if !self.in_band(pitch) {
            return;
        }
        self.active
            .insert(channel as u32 * 128 + pitch as u32, velocity);
        self.recompute();
    }

    fn note_off(&mut self, channel: u8, pitch: u8) {
        if !self.in_band(pitch) {
            return;
        }
        self.active.remove(&(channel as u32 * 128 + pitch as u32));
        self.recompute();
    }

    fn all_notes_off(&mut self, channel: Option<u8>) {
        match channel {
            None => self.active.clear(),
            Some(ch) => self.active.retain(|key, _| key / 128 != ch as u32),
        }
        self.recompute();
    }

    fn process(&mut self, _ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        // Control inputs may modulate the band and mode live.
        if let Some(mode) = buffers.control.get("mode") {
            self.mode = (mode.value as i32).clamp(0, 3) as u8;
        }
        if let Some(lo) = buffers.control.get("pitch_lo") {
            self.pitch_lo = (lo.value as i32).clamp(0, 127) as u8;
        }
        if let Some(hi) = buffers.control.get("pitch_hi") {
            self.pitch_hi = (hi.value as i32).clamp(0, 127) as u8;
        }
        self.recompute();

        if let Some(out) = buffers.control.get_mut("control_out") {
            out.value = self.current_value;
        }
    }
}
