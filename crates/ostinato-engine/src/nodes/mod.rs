//! Node variants the graph evaluates.
//!
//! The graph sees one flat sum type: the built-in node kinds plus a single
//! adapter variant wrapping a registry plugin behind the plugin trait
//! object. Variant-specific behavior (track-source fan-out, adapter event
//! routing, mixer live config) is reached by matching, not downcasting.

mod control_source;
mod mixer;
mod note_gate;
mod sine;
mod track_source;

pub use control_source::ControlSourceNode;
pub use mixer::MixerNode;
pub use note_gate::NoteGateNode;
pub use sine::SineNode;
pub use track_source::{PreviewNote, PreviewOff, TrackSourceNode};

use ostinato_plugin_sdk::ProcessContext;

use crate::adapter::PluginAdapterNode;
use crate::node::{PortBuffer, PortDecl};

/// Cheap tag stored on the graph entry so control-thread lookups (preview
/// targets, live config) don't need the node lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Sine,
    Mixer,
    TrackSource,
    ControlSource,
    NoteGate,
    Adapter,
}

pub enum Node {
    Sine(SineNode),
    Mixer(MixerNode),
    TrackSource(TrackSourceNode),
    ControlSource(ControlSourceNode),
    NoteGate(NoteGateNode),
    Adapter(PluginAdapterNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Sine(_) => NodeKind::Sine,
            Node::Mixer(_) => NodeKind::Mixer,
            Node::TrackSource(_) => NodeKind::TrackSource,
            Node::ControlSource(_) => NodeKind::ControlSource,
            Node::NoteGate(_) => NodeKind::NoteGate,
            Node::Adapter(_) => NodeKind::Adapter,
        }
    }

    pub fn declare_ports(&self) -> Vec<PortDecl> {
        match self {
            Node::Sine(n) => n.declare_ports(),
            Node::Mixer(n) => n.declare_ports(),
            Node::TrackSource(n) => n.declare_ports(),
            Node::ControlSource(n) => n.declare_ports(),
            Node::NoteGate(n) => n.declare_ports(),
            Node::Adapter(n) => n.declare_ports(),
        }
    }

    pub fn activate(&mut self, sample_rate: f32, max_block_size: usize) {
        match self {
            Node::Sine(n) => n.activate(sample_rate, max_block_size),
            Node::Adapter(n) => n.activate(sample_rate, max_block_size),
            Node::Mixer(_) | Node::TrackSource(_) | Node::ControlSource(_) | Node::NoteGate(_) => {}
        }
    }

    pub fn deactivate(&mut self) {
        if let Node::Adapter(n) = self {
            n.deactivate();
        }
    }

    pub fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &[PortBuffer],
        outputs: &mut [PortBuffer],
    ) {
        match self {
            Node::Sine(n) => n.process(ctx, inputs, outputs),
            Node::Mixer(n) => n.process(ctx, inputs, outputs),
            // Preview drain happens at the graph level, where downstream
            // nodes are reachable.
            Node::TrackSource(_) => {}
            Node::ControlSource(n) => n.process(ctx, inputs, outputs),
            Node::NoteGate(n) => n.process(ctx, inputs, outputs),
            Node::Adapter(n) => n.process(ctx, inputs, outputs),
        }
    }

    pub fn set_param(&mut self, name: &str, value: f32) {
        match self {
            Node::Sine(n) => n.set_param(name, value),
            Node::Mixer(n) => n.set_param(name, value),
            Node::NoteGate(n) => n.set_param(name, value),
            Node::Adapter(n) => n.set_param(name, value),
            Node::TrackSource(_) | Node::ControlSource(_) => {}
        }
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        match self {
            Node::Sine(n) => n.note_on(channel, pitch, velocity),
            Node::NoteGate(n) => n.note_on(channel, pitch, velocity),
            Node::Adapter(n) => n.note_on(channel, pitch, velocity),
            _ => {}
        }
    }

    pub fn note_off(&mut self, channel: u8, pitch: u8) {
        match self {
            Node::Sine(n) => n.note_off(channel, pitch),
            Node::NoteGate(n) => n.note_off(channel, pitch),
            Node::Adapter(n) => n.note_off(channel, pitch),
            _ => {}
        }
    }

    pub fn all_notes_off(&mut self, channel: Option<u8>) {
        match self {
            Node::Sine(n) => n.all_notes_off(channel),
            Node::NoteGate(n) => n.all_notes_off(channel),
            Node::Adapter(n) => n.all_notes_off(channel),
            // Preview is independent of the transport: schedule held
            // preview notes for retrigger instead of dropping them.
            Node::TrackSource(n) => n.transport_all_notes_off(),
            _ => {}
        }
    }

    pub fn program_change(&mut self, channel: u8, bank: u8, program: u8) {
        if let Node::Adapter(n) = self {
            n.program_change(channel, bank, program);
        }
    }

    pub fn pitch_bend(&mut self, channel: u8, value: u16) {
        if let Node::Adapter(n) = self {
            n.pitch_bend(channel, value);
        }
    }

    pub fn channel_volume(&mut self, channel: u8, volume: u8) {
        if let Node::Adapter(n) = self {
            n.channel_volume(channel, volume);
        }
    }

    pub fn push_control(&mut self, beat: f64, value: f32) {
        match self {
            Node::ControlSource(n) => n.push_control(beat, value),
            Node::Adapter(n) => n.push_control(beat, value),
            _ => {}
        }
    }
}
