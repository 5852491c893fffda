//! The signal graph: node set, connections, topological evaluation order,
//! buffer wiring, block evaluator, and event-output routing.
//!
//! A graph is built and activated on the control thread, then published to
//! the audio thread behind an atomic swap. The audio thread only ever calls
//! `process`, `deliver` and the event helpers; per-node state is guarded by
//! a short per-entry lock that the control thread touches only for
//! parameter writes, preview injection, and monitor readback.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use ostinato_plugin_sdk::{PluginRegistry, ProcessContext};

use crate::adapter::PluginAdapterNode;
use crate::error::{EngineError, GraphError};
use crate::node::{PortBuffer, PortDecl, PortKind};
use crate::nodes::{
    ControlSourceNode, MixerNode, Node, NodeKind, NoteGateNode, SineNode, TrackSourceNode,
};
use crate::pool::{BufferPool, SILENT_BUFFER};

/// JSON graph description submitted by the control process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDesc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f32>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionDesc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sf2_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lv2_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_lo: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_hi: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate_mode: Option<i32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, serde_json::Value>,
}

impl NodeSpec {
    pub fn new(id: &str, node_type: &str) -> Self {
        Self {
            id: id.to_owned(),
            node_type: node_type.to_owned(),
            sf2_path: None,
            lv2_uri: None,
            sample_path: None,
            channel_count: None,
            pitch_lo: None,
            pitch_hi: None,
            gate_mode: None,
            params: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDesc {
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

impl ConnectionDesc {
    pub fn new(from_node: &str, from_port: &str, to_node: &str, to_port: &str) -> Self {
        Self {
            from_node: from_node.to_owned(),
            from_port: from_port.to_owned(),
            to_node: to_node.to_owned(),
            to_port: to_port.to_owned(),
        }
    }
}

/// A scheduled or routed event addressed to one node.
#[derive(Debug, Clone, Copy)]
pub enum GraphEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    Program { channel: u8, bank: u8, program: u8 },
    Volume { channel: u8, volume: u8 },
    Bend { channel: u8, value: u16 },
    Control { beat: f64, value: f32 },
    AllNotesOff { channel: Option<u8> },
}

pub(crate) struct NodeSlot {
    pub node: Node,
    pub inputs: Vec<PortBuffer>,
    pub outputs: Vec<PortBuffer>,
}

struct NodeEntry {
    id: String,
    kind: NodeKind,
    slot: Mutex<NodeSlot>,
    ports: Vec<PortDecl>,
    input_bufs: Vec<usize>,
    output_bufs: Vec<usize>,
    /// Numeric params from the description, applied after activation so
    /// plugin-internal buffers exist by then.
    init_params: Vec<(String, f32)>,
    /// Track-source fan-out targets, resolved at activation.
    downstream: Vec<usize>,
    /// Adapter event-output routing: port id -> destination entries.
    event_routes: Vec<(String, Vec<usize>)>,
}

pub struct Graph {
    entries: Vec<NodeEntry>,
    node_index: HashMap<String, usize>,
    connections: Vec<ConnectionDesc>,
    eval_order: Vec<usize>,
    pool: BufferPool,
    /// Pool indices of the conventional mixer's stereo output.
    output_bufs: Option<(usize, usize)>,
    block_size: usize,
    activated: bool,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("node_count", &self.entries.len())
            .field("connections", &self.connections)
            .field("block_size", &self.block_size)
            .field("activated", &self.activated)
            .finish()
    }
}

impl Graph {
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let desc: GraphDesc = serde_json::from_str(json)?;
        Self::from_desc(&desc)
    }

    pub fn from_desc(desc: &GraphDesc) -> Result<Self, GraphError> {
        let mut graph = Graph {
            entries: Vec::new(),
            node_index: HashMap::new(),
            connections: Vec::new(),
            eval_order: Vec::new(),
            pool: BufferPool::new(),
            output_bufs: None,
            block_size: 0,
            activated: false,
        };

        for spec in &desc.nodes {
            if graph.node_index.contains_key(&spec.id) {
                return Err(GraphError::DuplicateNode(spec.id.clone()));
            }
            let (node, init_params) = build_node(spec)?;
            let ports = node.declare_ports();
            let kind = node.kind();
            graph.node_index.insert(spec.id.clone(), graph.entries.len());
            graph.entries.push(NodeEntry {
                id: spec.id.clone(),
                kind,
                slot: Mutex::new(NodeSlot {
                    node,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                }),
                ports,
                input_bufs: Vec::new(),
                output_bufs: Vec::new(),
                init_params,
                downstream: Vec::new(),
                event_routes: Vec::new(),
            });
        }

        for conn in &desc.connections {
            if conn.from_node == conn.to_node {
                tracing::warn!(node = %conn.from_node, "dropping self-connection");
                continue;
            }
            graph.connections.push(conn.clone());
        }

        Ok(graph)
    }

    /// Allocate buffers, compute the evaluation order, activate every node
    /// and apply its initial params, then resolve fan-out and routing
    /// tables. Runs on the control thread before the graph is published.
    pub fn activate(&mut self, sample_rate: f32, max_block_size: usize) -> Result<(), GraphError> {
        self.block_size = max_block_size;

        match self.topo_sort() {
            Some(order) => self.eval_order = order,
            None => {
                // Non-fatal: fall back to declaration order so linear
                // chains still play.
                tracing::warn!("cycle detected in signal graph; using declaration order");
                self.eval_order = (0..self.entries.len()).collect();
            }
        }

        self.assign_buffers()?;

        for entry in &mut self.entries {
            let slot = entry.slot.get_mut();
            slot.node.activate(sample_rate, max_block_size);
            for (name, value) in &entry.init_params {
                slot.node.set_param(name, *value);
            }
        }

        self.resolve_routing();
        self.activated = true;
        Ok(())
    }

    pub fn deactivate(&self) {
        for entry in &self.entries {
            entry.slot.lock().node.deactivate();
        }
    }

    /// Kahn's algorithm over node indices. Returns None when the
    /// connection graph is not a DAG.
    fn topo_sort(&self) -> Option<Vec<usize>> {
        let count = self.entries.len();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];

        for conn in &self.connections {
            let (Some(&from), Some(&to)) = (
                self.node_index.get(&conn.from_node),
                self.node_index.get(&conn.to_node),
            ) else {
                continue;
            };
            adjacency[from].push(to);
            in_degree[to] += 1;
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(index) = queue.pop_front() {
            order.push(index);
            for &next in &adjacency[index] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        (order.len() == count).then_some(order)
    }

    /// Assign every output port a unique pool buffer (index 0 is the
    /// reserved silent buffer) and wire inputs from the connection list.
    fn assign_buffers(&mut self) -> Result<(), GraphError> {
        let mut buf_count = 1usize;
        for entry in &mut self.entries {
            let out_count = entry.ports.iter().filter(|p| p.is_output).count();
            let in_count = entry.ports.len() - out_count;
            entry.output_bufs = (0..out_count).map(|i| buf_count + i).collect();
            buf_count += out_count;
            entry.input_bufs = vec![SILENT_BUFFER; in_count];
        }

        self.pool.allocate(buf_count, self.block_size);

        // "node/port" -> pool index for every output port.
        let mut port_buf: HashMap<(usize, String), usize> = HashMap::new();
        for (index, entry) in self.entries.iter().enumerate() {
            let mut out_i = 0usize;
            for port in &entry.ports {
                if port.is_output {
                    port_buf.insert((index, port.name.clone()), entry.output_bufs[out_i]);
                    out_i += 1;
                }
            }
        }

        let mut wired: HashSet<(usize, usize)> = HashSet::new();
        let mut assignments: Vec<(usize, usize, usize)> = Vec::new();
        for conn in &self.connections {
            let (Some(&from), Some(&to)) = (
                self.node_index.get(&conn.from_node),
                self.node_index.get(&conn.to_node),
            ) else {
                continue;
            };
            let Some(&source_buf) = port_buf.get(&(from, conn.from_port.clone())) else {
                // Event ports (and typos) have no buffer; they are routed
                // out of band.
                continue;
            };

            let dest = &self.entries[to];
            let mut in_i = 0usize;
            let mut found = false;
            for port in &dest.ports {
                if port.is_output {
                    continue;
                }
                if port.name == conn.to_port {
                    if !wired.insert((to, in_i)) {
                        return Err(GraphError::DuplicateInput {
                            node: conn.to_node.clone(),
                            port: conn.to_port.clone(),
                        });
                    }
                    assignments.push((to, in_i, source_buf));
                    found = true;
                    break;
                }
                in_i += 1;
            }
            if !found {
                tracing::warn!(
                    node = %conn.to_node,
                    port = %conn.to_port,
                    "connection to unknown input port ignored"
                );
            }
        }
        for (to, in_i, source_buf) in assignments {
            self.entries[to].input_bufs[in_i] = source_buf;
        }

        // Per-entry buffer views, one per declared port in order.
        for entry in &mut self.entries {
            let slot = entry.slot.get_mut();
            slot.inputs.clear();
            slot.outputs.clear();
            for port in &entry.ports {
                let view = PortBuffer::detached(match port.kind {
                    PortKind::Audio => PortKind::Audio,
                    PortKind::Control => PortKind::Control,
                });
                if port.is_output {
                    slot.outputs.push(view);
                } else {
                    slot.inputs.push(view);
                }
            }
        }

        // Cache the conventional mixer's stereo output buffers.
        self.output_bufs = self.locate_output(&port_buf);

        Ok(())
    }

    fn locate_output(&self, port_buf: &HashMap<(usize, String), usize>) -> Option<(usize, usize)> {
        let stereo_out = |index: usize| {
            let left = port_buf.get(&(index, "audio_out_L".to_owned()))?;
            let right = port_buf.get(&(index, "audio_out_R".to_owned()))?;
            Some((*left, *right))
        };

        if let Some(&index) = self.node_index.get("mixer") {
            if let Some(bufs) = stereo_out(index) {
                return Some(bufs);
            }
        }
        // No node named "mixer": take the most downstream node exposing the
        // standard stereo output ports.
        self.eval_order
            .iter()
            .rev()
            .find_map(|&index| stereo_out(index))
    }

    /// Resolve track-source fan-out targets, adapter event routes, and
    /// adapter control-connection flags.
    fn resolve_routing(&mut self) {
        for index in 0..self.entries.len() {
            let id = self.entries[index].id.clone();

            if self.entries[index].kind == NodeKind::TrackSource {
                let mut downstream = Vec::new();
                for conn in &self.connections {
                    if conn.from_node != id {
                        continue;
                    }
                    let Some(&dest) = self.node_index.get(&conn.to_node) else {
                        continue;
                    };
                    if dest != index && !downstream.contains(&dest) {
                        downstream.push(dest);
                    }
                }
                self.entries[index].downstream = downstream;
            }

            if self.entries[index].kind == NodeKind::Adapter {
                let mut routes: Vec<(String, Vec<usize>)> = Vec::new();
                let mut connected: Vec<String> = Vec::new();
                {
                    let slot = self.entries[index].slot.get_mut();
                    if let Node::Adapter(adapter) = &slot.node {
                        for (port_id, _) in adapter.event_outputs() {
                            let mut dests = Vec::new();
                            for conn in &self.connections {
                                if conn.from_node != id || &conn.from_port != port_id {
                                    continue;
                                }
                                let Some(&dest) = self.node_index.get(&conn.to_node) else {
                                    continue;
                                };
                                if dest != index && !dests.contains(&dest) {
                                    dests.push(dest);
                                }
                            }
                            routes.push((port_id.clone(), dests));
                        }
                    }
                }
                // Control inputs with a live upstream connection read the
                // graph value instead of the pending default. The source
                // port must be a declared output on the source node;
                // connections from monitor ports (which are never
                // declared) do not count as live.
                for conn in &self.connections {
                    if conn.to_node != id {
                        continue;
                    }
                    let is_control_input = self.entries[index]
                        .ports
                        .iter()
                        .any(|p| !p.is_output && p.kind == PortKind::Control && p.name == conn.to_port);
                    let source_declared = self
                        .node_index
                        .get(&conn.from_node)
                        .map(|&src| {
                            self.entries[src]
                                .ports
                                .iter()
                                .any(|p| p.is_output && p.name == conn.from_port)
                        })
                        .unwrap_or(false);
                    if is_control_input && source_declared {
                        connected.push(conn.to_port.clone());
                    }
                }
                let slot = self.entries[index].slot.get_mut();
                if let Node::Adapter(adapter) = &mut slot.node {
                    for port in connected {
                        adapter.set_control_connected(&port, true);
                    }
                }
                self.entries[index].event_routes = routes;
            }
        }
    }

    /// Evaluate one block. Must only be called from the thread driving the
    /// graph (the audio callback, or the offline renderer which callers
    /// serialize against live playback).
    pub fn process(&self, ctx: &ProcessContext) {
        if !self.activated {
            return;
        }
        let frames = ctx.block_size.min(self.block_size);
        if frames == 0 {
            return;
        }
        let ctx = ProcessContext {
            block_size: frames,
            ..*ctx
        };

        self.pool.zero(SILENT_BUFFER, frames);

        for &index in &self.eval_order {
            let entry = &self.entries[index];
            let mut guard = entry.slot.lock();
            let NodeSlot {
                node,
                inputs,
                outputs,
            } = &mut *guard;

            for (i, view) in inputs.iter_mut().enumerate() {
                let buf = entry.input_bufs[i];
                view.bind(self.pool.audio_ptr(buf), frames);
                if view.kind == PortKind::Control {
                    view.control = self.pool.control_value(buf);
                }
            }
            for (i, view) in outputs.iter_mut().enumerate() {
                let buf = entry.output_bufs[i];
                view.bind(self.pool.audio_ptr(buf), frames);
                if view.kind == PortKind::Control {
                    view.control = 0.0;
                }
            }

            // Drain preview queues here, at the source's position in the
            // evaluation order: downstream nodes have not processed yet, so
            // injected events take effect this block.
            if let Node::TrackSource(source) = node {
                if source.retrigger_held {
                    source.retrigger_held = false;
                    for i in 0..source.held.len() {
                        let held = source.held[i];
                        for &dest in &entry.downstream {
                            self.with_node(dest, |n| {
                                n.note_on(held.channel, held.pitch, held.velocity)
                            });
                        }
                    }
                }
                for i in 0..source.pending_off.len() {
                    let off = source.pending_off[i];
                    for &dest in &entry.downstream {
                        self.with_node(dest, |n| match off {
                            crate::nodes::PreviewOff::AllChannels => n.all_notes_off(None),
                            crate::nodes::PreviewOff::Note { channel, pitch } => {
                                n.note_off(channel, pitch)
                            }
                        });
                    }
                }
                source.pending_off.clear();
                for i in 0..source.pending_on.len() {
                    let on = source.pending_on[i];
                    for &dest in &entry.downstream {
                        self.with_node(dest, |n| n.note_on(on.channel, on.pitch, on.velocity));
                    }
                }
                source.pending_on.clear();
            }

            node.process(&ctx, inputs, outputs);

            for (i, view) in outputs.iter().enumerate() {
                if view.kind == PortKind::Control {
                    self.pool.set_control(entry.output_bufs[i], view.control);
                }
            }

            // Route adapter event outputs to their downstream nodes within
            // the same block.
            if let Node::Adapter(adapter) = node {
                for (port_id, events) in adapter.event_outputs() {
                    if events.is_empty() {
                        continue;
                    }
                    let Some((_, dests)) =
                        entry.event_routes.iter().find(|(p, _)| p == port_id)
                    else {
                        continue;
                    };
                    for &dest in dests {
                        self.with_node(dest, |n| {
                            for event in events {
                                let status = event.status & 0xF0;
                                if status == 0x90 && event.data2 > 0 {
                                    n.note_on(event.channel, event.data1, event.data2);
                                } else if status == 0x80 || (status == 0x90 && event.data2 == 0) {
                                    n.note_off(event.channel, event.data1);
                                } else if status == 0xE0 {
                                    let value =
                                        event.data1 as u16 | ((event.data2 as u16) << 7);
                                    n.pitch_bend(event.channel, value);
                                } else if status == 0xC0 {
                                    n.program_change(event.channel, 0, event.data1);
                                }
                            }
                        });
                    }
                }
            }
        }
    }

    fn with_node<R>(&self, index: usize, f: impl FnOnce(&mut Node) -> R) -> R {
        let mut guard = self.entries[index].slot.lock();
        f(&mut guard.node)
    }

    /// Deliver one event to the addressed node. Track sources fan the event
    /// out to their downstream set; unknown node ids are silently dropped
    /// (stale schedules must not halt the engine).
    pub fn deliver(&self, node_id: &str, event: GraphEvent) {
        let Some(&index) = self.node_index.get(node_id) else {
            return;
        };
        if self.entries[index].kind == NodeKind::TrackSource {
            let entry = &self.entries[index];
            for &dest in &entry.downstream {
                self.apply(dest, event);
            }
        } else {
            self.apply(index, event);
        }
    }

    fn apply(&self, index: usize, event: GraphEvent) {
        self.with_node(index, |node| match event {
            GraphEvent::NoteOn {
                channel,
                pitch,
                velocity,
            } => node.note_on(channel, pitch, velocity),
            GraphEvent::NoteOff { channel, pitch } => node.note_off(channel, pitch),
            GraphEvent::Program {
                channel,
                bank,
                program,
            } => node.program_change(channel, bank, program),
            GraphEvent::Volume { channel, volume } => node.channel_volume(channel, volume),
            GraphEvent::Bend { channel, value } => node.pitch_bend(channel, value),
            GraphEvent::Control { beat, value } => node.push_control(beat, value),
            GraphEvent::AllNotesOff { channel } => node.all_notes_off(channel),
        });
    }

    /// Transport stop/seek/end-of-arrangement: silence every node.
    pub fn all_notes_off(&self) {
        for index in 0..self.entries.len() {
            self.with_node(index, |node| node.all_notes_off(None));
        }
    }

    pub fn set_param(&self, node_id: &str, name: &str, value: f32) {
        if let Some(&index) = self.node_index.get(node_id) {
            self.with_node(index, |node| node.set_param(name, value));
        }
    }

    /// After `process`, copy the cached stereo output into `left`/`right`.
    /// Returns false (leaving the slices untouched) when the graph has no
    /// conventional output node.
    pub fn copy_output(&self, left: &mut [f32], right: &mut [f32]) -> bool {
        let Some((l, r)) = self.output_bufs else {
            return false;
        };
        let source_l = self.pool.audio_slice(l, left.len());
        let source_r = self.pool.audio_slice(r, right.len());
        left[..source_l.len()].copy_from_slice(source_l);
        right[..source_r.len()].copy_from_slice(source_r);
        true
    }

    pub fn node_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node_index.contains_key(node_id)
    }

    pub fn node_kind(&self, node_id: &str) -> Option<NodeKind> {
        self.node_index
            .get(node_id)
            .map(|&index| self.entries[index].kind)
    }

    /// Evaluation order as node ids, for diagnostics.
    pub fn eval_order(&self) -> Vec<String> {
        self.eval_order
            .iter()
            .map(|&index| self.entries[index].id.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Preview injection (control thread)
    // ------------------------------------------------------------------

    /// Resolve a preview target: the addressed track source, or the first
    /// track source in evaluation order when `node_id` is empty.
    pub fn preview_target(&self, node_id: &str) -> Option<usize> {
        if node_id.is_empty() {
            return self
                .eval_order
                .iter()
                .copied()
                .find(|&index| self.entries[index].kind == NodeKind::TrackSource);
        }
        let &index = self.node_index.get(node_id)?;
        (self.entries[index].kind == NodeKind::TrackSource).then_some(index)
    }

    pub fn preview_note_on(&self, index: usize, channel: u8, pitch: u8, velocity: u8) {
        self.with_node(index, |node| {
            if let Node::TrackSource(source) = node {
                source.preview_note_on(channel, pitch, velocity);
            }
        });
    }

    pub fn preview_note_off(&self, index: usize, channel: u8, pitch: u8) {
        self.with_node(index, |node| {
            if let Node::TrackSource(source) = node {
                source.preview_note_off(channel, pitch);
            }
        });
    }

    pub fn preview_all_notes_off(&self, index: usize) {
        self.with_node(index, |node| {
            if let Node::TrackSource(source) = node {
                source.preview_all_notes_off();
            }
        });
    }

    /// Silence preview on every track source.
    pub fn preview_all_sources_off(&self) {
        for index in 0..self.entries.len() {
            if self.entries[index].kind == NodeKind::TrackSource {
                self.preview_all_notes_off(index);
            }
        }
    }

    // ------------------------------------------------------------------
    // Live node access (control thread)
    // ------------------------------------------------------------------

    /// Apply live config changes by node type. Unsupported keys return a
    /// descriptive error.
    pub fn set_node_config(
        &self,
        node_id: &str,
        config: &serde_json::Value,
    ) -> Result<(), EngineError> {
        let Some(&index) = self.node_index.get(node_id) else {
            return Err(EngineError::UnknownNode(node_id.to_owned()));
        };
        let object = config
            .as_object()
            .ok_or_else(|| EngineError::Config("config must be a JSON object".to_owned()))?;

        match self.entries[index].kind {
            NodeKind::Mixer => {
                for (key, value) in object {
                    match key.as_str() {
                        "master_gain" => {
                            let gain = value.as_f64().ok_or_else(|| {
                                EngineError::Config("master_gain must be a number".to_owned())
                            })?;
                            self.with_node(index, |n| n.set_param("master_gain", gain as f32));
                        }
                        "channel_count" => {
                            return Err(EngineError::Config(
                                "channel_count changes require a set_graph call".to_owned(),
                            ));
                        }
                        other => {
                            return Err(EngineError::Config(format!(
                                "unsupported mixer config key: {other}"
                            )));
                        }
                    }
                }
                Ok(())
            }
            NodeKind::NoteGate => {
                for (key, value) in object {
                    match key.as_str() {
                        "pitch_lo" | "pitch_hi" | "mode" => {
                            let v = value.as_f64().ok_or_else(|| {
                                EngineError::Config(format!("{key} must be a number"))
                            })?;
                            self.with_node(index, |n| n.set_param(key, v as f32));
                        }
                        other => {
                            return Err(EngineError::Config(format!(
                                "unsupported note_gate config key: {other}"
                            )));
                        }
                    }
                }
                Ok(())
            }
            NodeKind::Sine => {
                for (key, value) in object {
                    match (key.as_str(), value.as_f64()) {
                        ("gain", Some(v)) => {
                            self.with_node(index, |n| n.set_param("gain", v as f32));
                        }
                        _ => {
                            return Err(EngineError::Config(format!(
                                "unsupported sine config key: {key}"
                            )));
                        }
                    }
                }
                Ok(())
            }
            NodeKind::Adapter => {
                let mut guard = self.entries[index].slot.lock();
                let Node::Adapter(adapter) = &mut guard.node else {
                    return Err(EngineError::Config("node kind mismatch".to_owned()));
                };
                for (key, value) in object {
                    // Config params (file paths, channel counts) shape the
                    // node itself and need a graph rebuild.
                    let is_config = matches!(key.as_str(), "sf2_path" | "lv2_uri" | "sample_path")
                        || adapter
                            .descriptor()
                            .config_params
                            .iter()
                            .any(|param| &param.id == key);
                    if is_config {
                        return Err(EngineError::Config(format!(
                            "{key} changes require a set_graph call"
                        )));
                    }
                    let Some(v) = value.as_f64() else {
                        return Err(EngineError::Config(format!(
                            "unsupported config value for key: {key}"
                        )));
                    };
                    adapter.set_param(key, v as f32);
                }
                Ok(())
            }
            _ => Err(EngineError::Config(
                "node type does not support set_node_config".to_owned(),
            )),
        }
    }

    /// Graph-editor payload readback, for adapter-backed nodes.
    pub fn get_node_data(&self, node_id: &str, port_id: &str) -> Result<String, EngineError> {
        let Some(&index) = self.node_index.get(node_id) else {
            return Err(EngineError::UnknownNode(node_id.to_owned()));
        };
        let mut guard = self.entries[index].slot.lock();
        match &mut guard.node {
            Node::Adapter(adapter) => Ok(adapter.get_graph_data(port_id)),
            _ => Err(EngineError::Config(
                "node type does not expose graph data".to_owned(),
            )),
        }
    }

    pub fn set_node_data(&self, node_id: &str, port_id: &str, json: &str) -> Result<(), EngineError> {
        let Some(&index) = self.node_index.get(node_id) else {
            return Err(EngineError::UnknownNode(node_id.to_owned()));
        };
        let mut guard = self.entries[index].slot.lock();
        match &mut guard.node {
            Node::Adapter(adapter) => {
                adapter.set_graph_data(port_id, json);
                Ok(())
            }
            _ => Err(EngineError::Config(
                "node type does not expose graph data".to_owned(),
            )),
        }
    }

    /// Monitor-port readback, for adapter-backed nodes.
    pub fn read_monitor(&self, node_id: &str, port_id: &str) -> Result<f32, EngineError> {
        let Some(&index) = self.node_index.get(node_id) else {
            return Err(EngineError::UnknownNode(node_id.to_owned()));
        };
        let guard = self.entries[index].slot.lock();
        match &guard.node {
            Node::Adapter(adapter) => Ok(adapter.read_monitor(port_id)),
            _ => Err(EngineError::Config(
                "node type has no monitor ports".to_owned(),
            )),
        }
    }
}

/// Build one node from its spec: plugin registry first (with configure
/// calls for string params), then the built-in fallbacks. Numeric params
/// are returned for deferred application after activation.
fn build_node(spec: &NodeSpec) -> Result<(Node, Vec<(String, f32)>), GraphError> {
    let mut init_params: Vec<(String, f32)> = Vec::new();
    let mut string_params: Vec<(String, String)> = Vec::new();
    for (key, value) in &spec.params {
        if let Some(number) = value.as_f64() {
            init_params.push((key.clone(), number as f32));
        } else if let Some(text) = value.as_str() {
            string_params.push((key.clone(), text.to_owned()));
        } else {
            tracing::warn!(node = %spec.id, param = %key, "ignoring non-numeric, non-string param");
        }
    }

    if PluginRegistry::contains(&spec.node_type) {
        let plugin = PluginRegistry::create(&spec.node_type).ok_or_else(|| {
            GraphError::NodeBuild {
                id: spec.id.clone(),
                reason: format!("plugin factory failed for type '{}'", spec.node_type),
            }
        })?;
        let mut adapter = PluginAdapterNode::new(&spec.id, plugin);
        for (key, value) in &string_params {
            adapter.configure(key, value);
        }
        // Forward the dedicated description fields as configure keys so
        // plugin-backed nodes receive them too.
        if let Some(path) = &spec.sf2_path {
            adapter.configure("sf2_path", path);
        }
        if let Some(uri) = &spec.lv2_uri {
            adapter.configure("lv2_uri", uri);
        }
        if let Some(path) = &spec.sample_path {
            adapter.configure("sample_path", path);
        }
        if let Some(count) = spec.channel_count {
            adapter.configure("channel_count", &count.to_string());
        }
        return Ok((Node::Adapter(adapter), init_params));
    }

    let node = match spec.node_type.as_str() {
        "sine" => Node::Sine(SineNode::new()),
        "mixer" => Node::Mixer(MixerNode::new(spec.channel_count.unwrap_or(2))),
        "track_source" => Node::TrackSource(TrackSourceNode::new()),
        "control_source" => Node::ControlSource(ControlSourceNode::new()),
        "note_gate" => Node::NoteGate(NoteGateNode::new(
            spec.pitch_lo.unwrap_or(0),
            spec.pitch_hi.unwrap_or(127),
            spec.gate_mode.unwrap_or(0),
        )),
        other => {
            return Err(GraphError::NodeBuild {
                id: spec.id.clone(),
                reason: format!("unknown node type: {other}"),
            });
        }
    };
    Ok((node, init_params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_round_trips_through_json() {
        let json = r#"{
            "bpm": 128.0,
            "nodes": [
                {"id": "t", "type": "track_source"},
                {"id": "s", "type": "sine", "params": {"gain": 0.25}},
                {"id": "mixer", "type": "mixer", "channel_count": 4}
            ],
            "connections": [
                {"from_node": "s", "from_port": "audio_out_L",
                 "to_node": "mixer", "to_port": "audio_in_L_0"}
            ]
        }"#;
        let desc: GraphDesc = serde_json::from_str(json).unwrap();
        let rendered = serde_json::to_string(&desc).unwrap();
        let again: GraphDesc = serde_json::from_str(&rendered).unwrap();

        assert_eq!(again.bpm, Some(128.0));
        assert_eq!(again.nodes.len(), 3);
        assert_eq!(again.nodes[2].channel_count, Some(4));
        assert_eq!(again.connections, desc.connections);
        assert_eq!(
            again.nodes[1].params.get("gain").and_then(|v| v.as_f64()),
            Some(0.25)
        );
    }

    #[test]
    fn builtin_fallback_graph_builds_without_a_registry() {
        // Bare node types bypass the plugin registry entirely.
        let json = r#"{
            "nodes": [
                {"id": "s", "type": "sine"},
                {"id": "mixer", "type": "mixer", "channel_count": 2}
            ],
            "connections": [
                {"from_node": "s", "from_port": "audio_out_L",
                 "to_node": "mixer", "to_port": "audio_in_L_0"},
                {"from_node": "s", "from_port": "audio_out_R",
                 "to_node": "mixer", "to_port": "audio_in_R_0"}
            ]
        }"#;
        let mut graph = Graph::from_json(json).unwrap();
        graph.activate(48_000.0, 256).unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.node_kind("s"), Some(NodeKind::Sine));

        graph.deliver(
            "s",
            GraphEvent::NoteOn {
                channel: 0,
                pitch: 60,
                velocity: 100,
            },
        );
        let ctx = ProcessContext {
            block_size: 256,
            sample_rate: 48_000.0,
            bpm: 120.0,
            beat_position: 0.0,
            beats_per_sample: 120.0 / 60.0 / 48_000.0,
        };
        graph.process(&ctx);

        let mut left = vec![0.0f32; 256];
        let mut right = vec![0.0f32; 256];
        assert!(graph.copy_output(&mut left, &mut right));
        assert!(left.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn self_connections_are_dropped() {
        let json = r#"{
            "nodes": [{"id": "mixer", "type": "mixer", "channel_count": 2}],
            "connections": [
                {"from_node": "mixer", "from_port": "audio_out_L",
                 "to_node": "mixer", "to_port": "audio_in_L_0"}
            ]
        }"#;
        let mut graph = Graph::from_json(json).unwrap();
        graph.activate(44_100.0, 64).unwrap();
        let ctx = ProcessContext {
            block_size: 64,
            sample_rate: 44_100.0,
            bpm: 120.0,
            beat_position: 0.0,
            beats_per_sample: 120.0 / 60.0 / 44_100.0,
        };
        graph.process(&ctx);
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let json = r#"{
            "nodes": [
                {"id": "a", "type": "sine"},
                {"id": "a", "type": "mixer"}
            ]
        }"#;
        assert!(matches!(
            Graph::from_json(json),
            Err(GraphError::DuplicateNode(id)) if id == "a"
        ));
    }
}
