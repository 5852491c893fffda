//! Bridges a registry plugin into the node-based signal graph.
//!
//! The adapter:
//! - expands stereo descriptor ports into `<id>_L` / `<id>_R` mono
//!   declarations for the graph,
//! - keeps event ports out of the declared-port list, accumulating input
//!   events from the node hooks and exposing output events for the graph
//!   to route after `process`,
//! - keeps Monitor-role ports out of the declared-port list as well: they
//!   are not routable and are read only from the control thread via
//!   `read_monitor`,
//! - holds a per-port atomic pending value for every control input so
//!   `set_param` lands lock-free and wins over the descriptor default,
//! - zeroes every audio output buffer before calling the plugin, and
//! - copies plugin-written control outputs back into the graph's per-port
//!   output slots.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ostinato_plugin_sdk::{
    AudioPortBuffer, ControlPortBuffer, EventPortBuffer, MidiEvent, Plugin, PluginBuffers,
    PluginDescriptor, PortRole, PortType, ProcessContext,
};

use crate::node::{PortBuffer, PortDecl, PortKind};

struct AudioPortMapping {
    is_stereo: bool,
}

struct ControlPortMapping {
    port_id: String,
    is_output: bool,
    default_value: f32,
    /// Most recent `set_param` value, bit-stored so the control thread can
    /// write while the audio thread reads.
    pending_value: AtomicU32,
    has_pending: AtomicBool,
    /// Set by graph activation when a live upstream connection was wired to
    /// this input; the graph value then takes priority over the pending
    /// default.
    is_connected: bool,
}

struct EventPortMapping {
    is_output: bool,
}

pub struct PluginAdapterNode {
    node_id: String,
    plugin: Box<dyn Plugin>,
    desc: PluginDescriptor,

    audio_map: Vec<AudioPortMapping>,
    control_map: Vec<ControlPortMapping>,
    event_map: Vec<EventPortMapping>,

    /// Pre-allocated buffers reused each process call.
    buffers: PluginBuffers,

    /// Event input accumulator: filled by the event hooks, exposed to the
    /// plugin during process, cleared afterwards.
    event_input_accum: Vec<MidiEvent>,

    /// Event output storage: cleared each block, filled by the plugin,
    /// read by the graph after process for downstream routing.
    event_outputs: Vec<(String, Vec<MidiEvent>)>,
}

impl PluginAdapterNode {
    pub fn new(node_id: &str, plugin: Box<dyn Plugin>) -> Self {
        let desc = plugin.descriptor();
        let mut adapter = Self {
            node_id: node_id.to_owned(),
            plugin,
            desc,
            audio_map: Vec::new(),
            control_map: Vec::new(),
            event_map: Vec::new(),
            buffers: PluginBuffers::default(),
            event_input_accum: Vec::new(),
            event_outputs: Vec::new(),
        };
        adapter.build_port_mapping();
        adapter
    }

    /// Rebuild the mapping tables from the cached descriptor. Also called
    /// after `configure` since config values may change the port list
    /// (e.g. the mixer's channel count).
    fn build_port_mapping(&mut self) {
        self.audio_map.clear();
        self.control_map.clear();
        self.event_map.clear();
        self.buffers.audio.clear();
        self.buffers.control.clear();
        self.buffers.events.clear();
        self.event_outputs.clear();

        for port in &self.desc.ports {
            let is_output = port.is_output();
            match port.port_type {
                PortType::AudioMono => {
                    self.audio_map.push(AudioPortMapping { is_stereo: false });
                    self.buffers
                        .audio
                        .insert(port.id.clone(), AudioPortBuffer::empty());
                }
                PortType::AudioStereo => {
                    self.audio_map.push(AudioPortMapping { is_stereo: true });
                    self.buffers
                        .audio
                        .insert(port.id.clone(), AudioPortBuffer::empty());
                }
                PortType::Control => {
                    self.control_map.push(ControlPortMapping {
                        port_id: port.id.clone(),
                        is_output,
                        default_value: port.default_value,
                        pending_value: AtomicU32::new(port.default_value.to_bits()),
                        has_pending: AtomicBool::new(false),
                        is_connected: false,
                    });
                    self.buffers
                        .control
                        .insert(port.id.clone(), ControlPortBuffer::default());
                }
                PortType::Event => {
                    self.event_map.push(EventPortMapping { is_output });
                    self.buffers
                        .events
                        .insert(port.id.clone(), EventPortBuffer::empty());
                    if is_output {
                        self.event_outputs.push((port.id.clone(), Vec::new()));
                    }
                }
            }
        }
    }

    pub fn declare_ports(&self) -> Vec<PortDecl> {
        let mut decls = Vec::new();
        for port in &self.desc.ports {
            // Monitor ports are control-thread readbacks, never graph
            // ports; the graph must not be able to route them.
            if port.role == PortRole::Monitor {
                continue;
            }
            let is_output = port.is_output();
            match port.port_type {
                PortType::AudioMono => {
                    decls.push(PortDecl::new(&port.id, PortKind::Audio, is_output));
                }
                PortType::AudioStereo => {
                    // One stereo plugin port becomes two mono graph ports.
                    decls.push(PortDecl::new(
                        &format!("{}_L", port.id),
                        PortKind::Audio,
                        is_output,
                    ));
                    decls.push(PortDecl::new(
                        &format!("{}_R", port.id),
                        PortKind::Audio,
                        is_output,
                    ));
                }
                PortType::Control => {
                    decls.push(
                        PortDecl::new(&port.id, PortKind::Control, is_output).with_range(
                            port.default_value,
                            port.min_value,
                            port.max_value,
                        ),
                    );
                }
                // Event ports never appear in the graph's port list: input
                // arrives through the node event hooks, output is read from
                // event_outputs() after process.
                PortType::Event => {}
            }
        }
        decls
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.desc
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    /// Control thread, before activation.
    pub fn configure(&mut self, key: &str, value: &str) {
        self.plugin.configure(key, value);
        // The descriptor may depend on configuration (dynamic port lists).
        self.desc = self.plugin.descriptor();
        self.build_port_mapping();
    }

    pub fn set_graph_data(&mut self, port_id: &str, json: &str) {
        self.plugin.set_graph_data(port_id, json);
    }

    pub fn get_graph_data(&self, port_id: &str) -> String {
        self.plugin.get_graph_data(port_id)
    }

    pub fn read_monitor(&self, port_id: &str) -> f32 {
        self.plugin.read_monitor(port_id)
    }

    pub fn activate(&mut self, sample_rate: f32, max_block_size: usize) {
        tracing::debug!(node = %self.node_id, sample_rate, max_block_size, "adapter activate");
        self.plugin.activate(sample_rate, max_block_size);
    }

    pub fn deactivate(&mut self) {
        tracing::debug!(node = %self.node_id, "adapter deactivate");
        self.plugin.deactivate();
    }

    /// Graph activation: mark a control input as fed by a live connection.
    pub fn set_control_connected(&mut self, port_id: &str, connected: bool) {
        if let Some(mapping) = self
            .control_map
            .iter_mut()
            .find(|m| m.port_id == port_id && !m.is_output)
        {
            mapping.is_connected = connected;
        }
    }

    /// Event outputs produced by the last process call.
    pub fn event_outputs(&self) -> &[(String, Vec<MidiEvent>)] {
        &self.event_outputs
    }

    pub fn set_param(&mut self, name: &str, value: f32) {
        for mapping in &self.control_map {
            if mapping.port_id == name && !mapping.is_output {
                mapping.pending_value.store(value.to_bits(), Ordering::Relaxed);
                mapping.has_pending.store(true, Ordering::Relaxed);
                return;
            }
        }
        tracing::debug!(node = %self.node_id, param = name, "unknown param ignored");
    }

    pub fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.event_input_accum
            .push(MidiEvent::note_on(channel, pitch, velocity));
        self.plugin.note_on(channel, pitch, velocity);
    }

    pub fn note_off(&mut self, channel: u8, pitch: u8) {
        self.event_input_accum
            .push(MidiEvent::note_off(channel, pitch));
        self.plugin.note_off(channel, pitch);
    }

    pub fn all_notes_off(&mut self, channel: Option<u8>) {
        self.plugin.all_notes_off(channel);
    }

    pub fn program_change(&mut self, channel: u8, bank: u8, program: u8) {
        self.plugin.program_change(channel, bank, program);
    }

    pub fn pitch_bend(&mut self, channel: u8, value: u16) {
        self.event_input_accum
            .push(MidiEvent::pitch_bend(channel, value));
        self.plugin.pitch_bend(channel, value);
    }

    pub fn channel_volume(&mut self, channel: u8, volume: u8) {
        self.plugin.channel_volume(channel, volume);
    }

    /// Scheduled control values land on the first non-output control port.
    pub fn push_control(&mut self, _beat: f64, value: f32) {
        for mapping in &self.control_map {
            if !mapping.is_output {
                mapping.pending_value.store(value.to_bits(), Ordering::Relaxed);
                mapping.has_pending.store(true, Ordering::Relaxed);
                return;
            }
        }
    }

    pub fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &[PortBuffer],
        outputs: &mut [PortBuffer],
    ) {
        // Walk the descriptor in declaration order, mirroring how the graph
        // split the PortDecl list into input and output sequences.
        let mut in_i = 0usize;
        let mut out_i = 0usize;
        let mut audio_i = 0usize;
        let mut control_i = 0usize;

        for port in &self.desc.ports {
            // Monitor ports have buffer-map entries but no graph slot.
            let is_monitor = port.role == PortRole::Monitor;
            let is_output = port.is_output();
            match port.port_type {
                PortType::AudioMono => {
                    let mapping = &self.audio_map[audio_i];
                    debug_assert!(!mapping.is_stereo);
                    let buffer = self.buffers.audio.at_mut(audio_i);
                    if is_monitor {
                        buffer.bind(std::ptr::null_mut(), std::ptr::null_mut(), ctx.block_size);
                    } else if is_output {
                        let out = &mut outputs[out_i];
                        out.audio_mut()[..ctx.block_size].fill(0.0);
                        buffer.bind(out.audio_ptr(), std::ptr::null_mut(), ctx.block_size);
                        out_i += 1;
                    } else {
                        buffer.bind(inputs[in_i].audio_ptr(), std::ptr::null_mut(), ctx.block_size);
                        in_i += 1;
                    }
                    audio_i += 1;
                }
                PortType::AudioStereo => {
                    let buffer = self.buffers.audio.at_mut(audio_i);
                    if is_monitor {
                        buffer.bind(std::ptr::null_mut(), std::ptr::null_mut(), ctx.block_size);
                    } else if is_output {
                        let left_ptr = outputs[out_i].audio_ptr();
                        let right_ptr = outputs[out_i + 1].audio_ptr();
                        outputs[out_i].audio_mut()[..ctx.block_size].fill(0.0);
                        outputs[out_i + 1].audio_mut()[..ctx.block_size].fill(0.0);
                        buffer.bind(left_ptr, right_ptr, ctx.block_size);
                        out_i += 2;
                    } else {
                        buffer.bind(
                            inputs[in_i].audio_ptr(),
                            inputs[in_i + 1].audio_ptr(),
                            ctx.block_size,
                        );
                        in_i += 2;
                    }
                    audio_i += 1;
                }
                PortType::Control => {
                    let mapping = &self.control_map[control_i];
                    let buffer = self.buffers.control.at_mut(control_i);
                    if is_monitor {
                        buffer.value = 0.0;
                    } else if is_output {
                        buffer.value = 0.0;
                        out_i += 1;
                    } else {
                        buffer.value = if mapping.is_connected {
                            inputs[in_i].control
                        } else if mapping.has_pending.load(Ordering::Relaxed) {
                            f32::from_bits(mapping.pending_value.load(Ordering::Relaxed))
                        } else {
                            mapping.default_value
                        };
                        in_i += 1;
                    }
                    control_i += 1;
                }
                PortType::Event => {}
            }
        }

        // Wire event buffers: inputs see the accumulated block events,
        // outputs get cleared append targets.
        let mut event_out_i = 0usize;
        for (event_i, mapping) in self.event_map.iter().enumerate() {
            let buffer = self.buffers.events.at_mut(event_i);
            if mapping.is_output {
                let storage = &mut self.event_outputs[event_out_i].1;
                storage.clear();
                buffer.bind_output(storage as *mut Vec<MidiEvent>);
                event_out_i += 1;
            } else {
                buffer.bind_input(&self.event_input_accum);
            }
        }

        self.plugin.process(ctx, &mut self.buffers);

        // Write control outputs back into the graph's output slots.
        // Monitor ports have no slot to write to.
        let mut out_i = 0usize;
        let mut control_i = 0usize;
        for port in &self.desc.ports {
            let is_output = port.is_output() && port.role != PortRole::Monitor;
            match port.port_type {
                PortType::AudioMono => {
                    if is_output {
                        out_i += 1;
                    }
                }
                PortType::AudioStereo => {
                    if is_output {
                        out_i += 2;
                    }
                }
                PortType::Control => {
                    if is_output {
                        outputs[out_i].control = self.buffers.control.at_mut(control_i).value;
                        out_i += 1;
                    }
                    control_i += 1;
                }
                PortType::Event => {}
            }
        }

        self.event_input_accum.clear();
    }
}
