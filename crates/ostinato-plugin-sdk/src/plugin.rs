//! The `Plugin` trait: the only contract a processing unit needs to
//! implement to participate in the signal graph.

use crate::buffers::{PluginBuffers, ProcessContext};
use crate::descriptor::PluginDescriptor;

pub trait Plugin: Send {
    /// Complete self-description. Must return the same result on every call
    /// for a given instance; the engine caches port maps built from it.
    fn descriptor(&self) -> PluginDescriptor;

    /// Called once when the plugin is placed in an active graph. Allocate
    /// internal buffers here.
    fn activate(&mut self, _sample_rate: f32, _max_block_size: usize) {}

    /// Called when the plugin is removed from the graph. May be called
    /// without a prior `activate` (e.g. when graph construction fails
    /// downstream).
    fn deactivate(&mut self) {}

    /// Deliver one string-encoded configuration value. Called on the control
    /// thread before `activate`, once per supplied config key.
    fn configure(&mut self, _key: &str, _value: &str) {}

    /// Process one block. Audio thread: no allocation, no locks, no IO.
    ///
    /// Audio output buffers are zeroed by the adapter before this call; the
    /// plugin adds or replaces. Event output buffers are cleared; the plugin
    /// appends.
    fn process(&mut self, ctx: &ProcessContext, buffers: &mut PluginBuffers);

    // Event hooks, audio thread. Used by nodes that do not declare an
    // explicit event input port. Default to no-ops.

    fn note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) {}

    fn note_off(&mut self, _channel: u8, _pitch: u8) {}

    /// `None` silences every channel.
    fn all_notes_off(&mut self, _channel: Option<u8>) {}

    /// 14-bit value, 8192 = center.
    fn pitch_bend(&mut self, _channel: u8, _value: u16) {}

    fn program_change(&mut self, _channel: u8, _bank: u8, _program: u8) {}

    fn control_change(&mut self, _channel: u8, _cc: u8, _value: u8) {}

    fn channel_volume(&mut self, _channel: u8, _volume: u8) {}

    /// Read the current value of a Monitor-role port. Control thread;
    /// implementations must use atomics internally.
    fn read_monitor(&self, _port_id: &str) -> f32 {
        0.0
    }

    /// Current editor payload for a graph-editor port, JSON-encoded. The
    /// payload format is plugin-defined.
    fn get_graph_data(&self, _port_id: &str) -> String {
        "{}".to_owned()
    }

    fn set_graph_data(&mut self, _port_id: &str, _json: &str) {}
}
