//! Built-in plugins for the Ostinato engine.
//!
//! Every plugin here is a plain consumer of the SDK contract; the engine
//! knows them only through the registry. Call [`register_builtin_plugins`]
//! once at startup, before the first graph build.

pub mod control;
pub mod effects;
pub mod events;
pub mod generators;

pub use control::{ControlLfoPlugin, ControlMonitorPlugin, ControlSourcePlugin};
pub use effects::{MixerPlugin, ReverbPlugin};
pub use events::{ArpeggiatorPlugin, NoteGatePlugin};
pub use generators::SinePlugin;

use ostinato_plugin_sdk::{Plugin, PluginRegistration, PluginRegistry};

fn boxed<P: Plugin + Default + 'static>() -> Box<dyn Plugin> {
    Box::new(P::default())
}

/// Register every built-in plugin with the process-wide registry.
/// Idempotent enough for tests: re-registration replaces earlier entries.
pub fn register_builtin_plugins() {
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<SinePlugin>));
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<NoteGatePlugin>));
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<ControlSourcePlugin>));
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<ControlMonitorPlugin>));
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<MixerPlugin>));
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<ReverbPlugin>));
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<ArpeggiatorPlugin>));
    PluginRegistry::add(PluginRegistration::from_factory(boxed::<ControlLfoPlugin>));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_are_registered() {
        register_builtin_plugins();
        for id in [
            "builtin.sine",
            "builtin.note_gate",
            "builtin.control_source",
            "builtin.control_monitor",
            "builtin.mixer",
            "builtin.reverb",
            "builtin.arpeggiator",
            "builtin.control_lfo",
        ] {
            assert!(PluginRegistry::create(id).is_some(), "missing {id}");
            assert!(PluginRegistry::find_descriptor(id).is_some());
        }
    }
}
