//! Port, configuration and plugin descriptors.
//!
//! A descriptor is immutable per plugin instance: `Plugin::descriptor` must
//! return the same result on every call so the engine can cache port maps at
//! activation time.

use serde::{Deserialize, Serialize};

/// What kind of signal flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    /// `f32[block_size]`, one channel of audio.
    AudioMono,
    /// Convenience: the engine allocates L+R mono buffers; the plugin sees a
    /// single left/right pointer pair.
    AudioStereo,
    /// MIDI-style event stream within a block.
    Event,
    /// Single `f32` per block (control rate).
    Control,
}

/// The role of a port within the signal graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    Input,
    Output,
    /// Secondary input (e.g. compressor key signal).
    Sidechain,
    /// Read-only output for display only. Not routable in the signal graph;
    /// sampled from the control thread via `read_monitor`.
    Monitor,
}

/// How a front end should present a control port. Metadata only; does not
/// affect processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlHint {
    Continuous,
    Toggle,
    Integer,
    Categorical,
    Radio,
    Meter,
    GraphEditor,
}

/// Fully describes one port of a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Machine-readable id, stable across versions.
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub doc: String,
    pub port_type: PortType,
    pub role: PortRole,

    // Control-specific metadata, ignored for audio and event ports.
    #[serde(default = "ControlHint::continuous")]
    pub hint: ControlHint,
    #[serde(default)]
    pub default_value: f32,
    #[serde(default)]
    pub min_value: f32,
    #[serde(default = "one")]
    pub max_value: f32,
    /// 0 = continuous, > 0 = stepped.
    #[serde(default)]
    pub step: f32,
    /// For categorical / radio hints: display label per integer value.
    #[serde(default)]
    pub choices: Vec<String>,
    /// For graph-editor hints: identifies the editor type, e.g. "eq_curve".
    #[serde(default)]
    pub graph_type: String,
    /// Whether the port shows as connectable in a graph editor by default.
    #[serde(default = "yes")]
    pub show_port_default: bool,
}

fn one() -> f32 {
    1.0
}

fn yes() -> bool {
    true
}

impl ControlHint {
    fn continuous() -> Self {
        ControlHint::Continuous
    }
}

impl PortDescriptor {
    pub fn audio_stereo(id: &str, display_name: &str, role: PortRole) -> Self {
        Self::new(id, display_name, PortType::AudioStereo, role)
    }

    pub fn audio_mono(id: &str, display_name: &str, role: PortRole) -> Self {
        Self::new(id, display_name, PortType::AudioMono, role)
    }

    pub fn event(id: &str, display_name: &str, role: PortRole) -> Self {
        Self::new(id, display_name, PortType::Event, role)
    }

    pub fn control(id: &str, display_name: &str, role: PortRole) -> Self {
        Self::new(id, display_name, PortType::Control, role)
    }

    pub fn new(id: &str, display_name: &str, port_type: PortType, role: PortRole) -> Self {
        Self {
            id: id.to_owned(),
            display_name: display_name.to_owned(),
            doc: String::new(),
            port_type,
            role,
            hint: ControlHint::Continuous,
            default_value: 0.0,
            min_value: 0.0,
            max_value: 1.0,
            step: 0.0,
            choices: Vec::new(),
            graph_type: String::new(),
            show_port_default: true,
        }
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_owned();
        self
    }

    pub fn with_hint(mut self, hint: ControlHint) -> Self {
        self.hint = hint;
        self
    }

    pub fn with_range(mut self, default: f32, min: f32, max: f32) -> Self {
        self.default_value = default;
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    pub fn is_output(&self) -> bool {
        matches!(self.role, PortRole::Output | PortRole::Monitor)
    }
}

/// Types for configuration parameters that do not flow through the signal
/// graph (file paths, text fields, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    String,
    FilePath,
    Integer,
    Float,
    Bool,
    Categorical,
}

/// A configuration parameter, delivered via `Plugin::configure` before
/// activation. Values are always string-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigParam {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub doc: String,
    pub config_type: ConfigType,
    pub default_value: String,
    /// For file paths: picker filter, e.g. `"SF2 Files (*.sf2);;All (*)"`.
    #[serde(default)]
    pub file_filter: String,
    #[serde(default)]
    pub choices: Vec<String>,
}

impl ConfigParam {
    pub fn new(id: &str, display_name: &str, config_type: ConfigType, default: &str) -> Self {
        Self {
            id: id.to_owned(),
            display_name: display_name.to_owned(),
            doc: String::new(),
            config_type,
            default_value: default.to_owned(),
            file_filter: String::new(),
            choices: Vec::new(),
        }
    }
}

/// Complete self-description of a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique id, e.g. `"builtin.sine"`.
    pub id: String,
    /// Shown in menus, e.g. `"Sine Synth"`.
    pub display_name: String,
    /// "Synth", "Effect", "Mixer", "EventGen", "EventEffect", "Utility", ...
    pub category: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "version_one")]
    pub version: u32,
    #[serde(default)]
    pub ports: Vec<PortDescriptor>,
    #[serde(default)]
    pub config_params: Vec<ConfigParam>,
}

fn version_one() -> u32 {
    1
}

impl PluginDescriptor {
    pub fn new(id: &str, display_name: &str, category: &str) -> Self {
        Self {
            id: id.to_owned(),
            display_name: display_name.to_owned(),
            category: category.to_owned(),
            doc: String::new(),
            author: String::new(),
            version: 1,
            ports: Vec::new(),
            config_params: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_ports_count_as_outputs() {
        let port = PortDescriptor::control("latest", "Latest", PortRole::Monitor);
        assert!(port.is_output());
        let port = PortDescriptor::control("gain", "Gain", PortRole::Input);
        assert!(!port.is_output());
    }

    #[test]
    fn descriptor_serde_round_trip() {
        let mut desc = PluginDescriptor::new("builtin.sine", "Sine Synth", "Synth");
        desc.ports
            .push(PortDescriptor::audio_stereo("audio_out", "Audio Out", PortRole::Output));
        desc.ports.push(
            PortDescriptor::control("gain", "Gain", PortRole::Input).with_range(0.15, 0.0, 1.0),
        );

        let json = serde_json::to_string(&desc).unwrap();
        let back: PluginDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, desc.id);
        assert_eq!(back.ports.len(), 2);
        assert_eq!(back.ports[1].default_value, 0.15);
    }
}
