//! Track source: the addressable event entry point for one sequencer track.
//!
//! Declares no ports. Scheduled events arriving through the dispatcher are
//! fanned out by the graph to the node's registered downstream set; preview
//! events injected from the control thread are queued here and drained by
//! the graph at the node's position in the evaluation order, so they reach
//! downstream nodes before those nodes process the same block.
//!
//! Transport all-notes-off is forwarded downstream only and leaves preview
//! state alone; `preview_all_notes_off` clears the queues and emits an
//! all-channel notes-off downstream.

use crate::node::PortDecl;

#[derive(Debug, Clone, Copy)]
pub struct PreviewNote {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
}

#[derive(Debug, Clone, Copy)]
pub enum PreviewOff {
    Note { channel: u8, pitch: u8 },
    AllChannels,
}

#[derive(Default)]
pub struct TrackSourceNode {
    // Queues are protected by the node's slot lock in the graph; the
    // control thread pushes, the audio thread drains at the top of process.
    pub(crate) pending_on: Vec<PreviewNote>,
    pub(crate) pending_off: Vec<PreviewOff>,
    /// Preview notes currently sounding (note-on delivered, no note-off
    /// yet). A transport all-notes-off silences downstream synths, so held
    /// preview notes are retriggered on the next block to keep preview
    /// independent of the transport.
    pub(crate) held: Vec<PreviewNote>,
    pub(crate) retrigger_held: bool,
}

impl TrackSourceNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_ports(&self) -> Vec<PortDecl> {
        // No ports: this node drives downstream nodes through direct event
        // delivery, not through the buffer graph. It still participates in
        // the evaluation order (no inputs, so it sorts first).
        Vec::new()
    }

    pub fn preview_note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        let note = PreviewNote {
            channel,
            pitch,
            velocity,
        };
        self.held
            .retain(|n| n.channel != channel || n.pitch != pitch);
        self.held.push(note);
        self.pending_on.push(note);
    }

    pub fn preview_note_off(&mut self, channel: u8, pitch: u8) {
        self.held
            .retain(|n| n.channel != channel || n.pitch != pitch);
        self.pending_off.push(PreviewOff::Note { channel, pitch });
    }

    pub fn preview_all_notes_off(&mut self) {
        self.pending_on.clear();
        self.held.clear();
        self.pending_off.push(PreviewOff::AllChannels);
    }

    /// Transport stop/seek path. Downstream synths are silenced separately
    /// by the graph; held preview notes come back next block.
    pub fn transport_all_notes_off(&mut self) {
        if !self.held.is_empty() {
            self.retrigger_held = true;
        }
    }

    pub fn has_pending_preview(&self) -> bool {
        !self.pending_on.is_empty() || !self.pending_off.is_empty() || self.retrigger_held
    }
}
