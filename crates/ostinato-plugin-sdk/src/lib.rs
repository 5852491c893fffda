//! Ostinato plugin SDK
//! ===================
//! The complete contract between a processing plugin and the audio engine:
//! self-describing port and configuration metadata, the block process call,
//! MIDI-style event hooks, and the process-wide plugin registry.
//!
//! Threading model:
//! - `descriptor()`, `configure()`, `read_monitor()` and
//!   `get/set_graph_data()` are called on the control thread.
//! - `activate()` / `deactivate()` are called on the control thread, never
//!   while `process()` is running.
//! - `process()` and the event hooks run on the audio thread and must not
//!   allocate, lock, or perform IO.

pub mod buffers;
pub mod descriptor;
pub mod plugin;
pub mod registry;

pub use buffers::{
    AudioPortBuffer, ControlPortBuffer, EventPortBuffer, MidiEvent, PluginBuffers, PortMap,
    ProcessContext,
};
pub use descriptor::{
    ConfigParam, ConfigType, ControlHint, PluginDescriptor, PortDescriptor, PortRole, PortType,
};
pub use plugin::Plugin;
pub use registry::{PluginRegistration, PluginRegistry};
