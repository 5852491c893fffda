//! The audio engine: composes the graph, dispatcher, transport, and stream
//! backend, and owns every control-thread operation plus the audio-thread
//! block callback.
//!
//! Two threads touch the hot path: the control thread (every public method
//! here) and the single callback thread driven by the stream backend.
//! Hand-offs follow one discipline throughout: graphs swap through an
//! atomic slot with epoch-tracked retirement, schedules swap through the
//! dispatcher's pending slot, loop state swaps through its own slot, and
//! transport changes ride a short mutex-guarded command queue.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use ostinato_plugin_sdk::ProcessContext;
use ostinato_rt::{AudioCallback, BeatClock, CallbackHandle, CommandQueue, GraphEpoch, LoopRegion};

use crate::backend::{AudioBackend, StreamConfig};
use crate::error::{EngineError, GraphError};
use crate::graph::{Graph, GraphDesc};
use crate::schedule::{Dispatcher, Schedule};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: f32,
    pub block_size: usize,
    /// Driver-specific output device index; `None` selects the default.
    pub output_device: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            block_size: 512,
            output_device: None,
        }
    }
}

/// Transport commands posted by the control thread and applied by the audio
/// callback at the top of its next block.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TransportCmd {
    Play,
    Stop,
    Seek(f64),
    AllNotesOff,
    SetBpm(f32),
}

/// State shared between the engine facade and the audio callback.
pub(crate) struct EngineShared {
    pub active_graph: ArcSwapOption<Graph>,
    pub dispatcher: Dispatcher,
    pub clock: BeatClock,
    pub pending_loop: ArcSwapOption<LoopRegion>,
    pub commands: CommandQueue<TransportCmd>,
    pub epoch: GraphEpoch,
}

impl EngineShared {
    fn new() -> Self {
        Self {
            active_graph: ArcSwapOption::from(None),
            dispatcher: Dispatcher::new(),
            clock: BeatClock::default(),
            pending_loop: ArcSwapOption::from(None),
            commands: CommandQueue::new(),
            epoch: GraphEpoch::new(),
        }
    }
}

struct RetiredGraph {
    graph: Arc<Graph>,
    /// Epoch observed when the replacement graph was installed. The audio
    /// thread has definitely finished a full block under the replacement
    /// once the counter has advanced past the block in flight at install
    /// time, i.e. `current >= installed + 2`.
    installed_epoch: u64,
}

pub struct AudioEngine {
    cfg: EngineConfig,
    shared: Arc<EngineShared>,
    backend: Option<Box<dyn AudioBackend>>,
    stream_open: bool,
    /// Strong reference to the graph the audio thread is executing.
    owned_graph: Option<Arc<Graph>>,
    retired: Vec<RetiredGraph>,
    /// One-generation schedule lag so the audio thread never drops the
    /// final reference to a schedule.
    owned_schedule: Option<Arc<Schedule>>,
    #[allow(dead_code)] // pins the outgoing schedule until the next swap
    prev_schedule: Option<Arc<Schedule>>,
}

impl AudioEngine {
    /// Engine with the default stream backend (cpal when the feature is
    /// enabled, none otherwise).
    pub fn new(cfg: EngineConfig) -> Self {
        #[cfg(feature = "cpal")]
        let backend: Option<Box<dyn AudioBackend>> =
            Some(Box::new(crate::backend::CpalBackend::new()));
        #[cfg(not(feature = "cpal"))]
        let backend: Option<Box<dyn AudioBackend>> = None;
        Self::with_backend_option(cfg, backend)
    }

    /// Engine with an injected stream backend (tests, alternative drivers).
    pub fn with_backend(cfg: EngineConfig, backend: Box<dyn AudioBackend>) -> Self {
        Self::with_backend_option(cfg, Some(backend))
    }

    fn with_backend_option(cfg: EngineConfig, backend: Option<Box<dyn AudioBackend>>) -> Self {
        Self {
            cfg,
            shared: Arc::new(EngineShared::new()),
            backend,
            stream_open: false,
            owned_graph: None,
            retired: Vec::new(),
            owned_schedule: None,
            prev_schedule: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn sample_rate(&self) -> f32 {
        self.cfg.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.cfg.block_size
    }

    // ------------------------------------------------------------------
    // Stream lifecycle
    // ------------------------------------------------------------------

    /// Acquire the output stream and start the callback. Idempotent.
    pub fn open(&mut self) -> Result<(), EngineError> {
        if self.stream_open {
            return Ok(());
        }
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| EngineError::Stream("no audio backend configured".to_owned()))?;
        let callback = EngineCallback::new(self.cfg.clone(), self.shared.clone());
        let stream_cfg = StreamConfig {
            sample_rate: self.cfg.sample_rate,
            block_size: self.cfg.block_size,
            output_device: self.cfg.output_device,
        };
        backend
            .start(&stream_cfg, CallbackHandle::new(Box::new(callback)))
            .map_err(|err| EngineError::Stream(err.to_string()))?;
        self.stream_open = true;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.stream_open
    }

    /// Stop the stream, then detach and release every graph.
    pub fn close(&mut self) {
        self.stop();
        if let Some(backend) = self.backend.as_mut() {
            backend.stop();
        }
        self.stream_open = false;

        // No callback can run past this point: deactivate and free both
        // the owned and any retiring graphs.
        self.shared.active_graph.store(None);
        if let Some(graph) = self.owned_graph.take() {
            graph.deactivate();
        }
        for retired in self.retired.drain(..) {
            retired.graph.deactivate();
        }
    }

    // ------------------------------------------------------------------
    // Graph management
    // ------------------------------------------------------------------

    pub fn set_graph(&mut self, graph_json: &str) -> Result<(), EngineError> {
        let desc: GraphDesc = serde_json::from_str(graph_json).map_err(GraphError::Parse)?;
        self.set_graph_desc(&desc)
    }

    /// Build, activate and atomically install a graph. The previously
    /// active graph is retired and freed only after the audio thread has
    /// completed at least one full block under the newer one.
    pub fn set_graph_desc(&mut self, desc: &GraphDesc) -> Result<(), EngineError> {
        let mut graph = Graph::from_desc(desc)?;
        graph.activate(self.cfg.sample_rate, self.cfg.block_size)?;
        if let Some(bpm) = desc.bpm {
            self.shared.clock.set_bpm(bpm.max(1.0));
        }

        let graph = Arc::new(graph);
        self.purge_retired();
        if let Some(previous) = self.owned_graph.replace(graph.clone()) {
            self.retired.push(RetiredGraph {
                graph: previous,
                installed_epoch: self.shared.epoch.current(),
            });
        }
        self.shared.active_graph.store(Some(graph));
        tracing::info!(nodes = desc.nodes.len(), "graph installed");
        Ok(())
    }

    /// Deactivate and drop retiring graphs the audio thread can no longer
    /// reference.
    fn purge_retired(&mut self) {
        let epoch = self.shared.epoch.current();
        let stream_open = self.stream_open;
        self.retired.retain(|retired| {
            let safe = !stream_open || epoch >= retired.installed_epoch + 2;
            if safe {
                retired.graph.deactivate();
            }
            !safe
        });
    }

    // ------------------------------------------------------------------
    // Schedule management
    // ------------------------------------------------------------------

    pub fn set_schedule(&mut self, schedule_json: &str) -> Result<(), EngineError> {
        let schedule = Schedule::from_json(schedule_json)?;
        self.install_schedule(schedule);
        Ok(())
    }

    pub fn install_schedule(&mut self, schedule: Schedule) {
        let schedule = Arc::new(schedule);
        self.prev_schedule = self.owned_schedule.replace(schedule.clone());

        let superseded = self.shared.dispatcher.swap_schedule(schedule);
        drop(superseded);
        // Cross the swap on this thread so the new length and event list
        // are observable before the first audio block runs. Harmless if the
        // audio thread got there first: check_pending is idempotent once
        // the slot is empty.
        let retired = self.shared.dispatcher.check_pending();
        drop(retired);
    }

    pub fn arrangement_length(&self) -> f64 {
        self.shared.dispatcher.arrangement_length()
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    pub fn play(&self) {
        self.shared.commands.push(TransportCmd::Play);
    }

    pub fn stop(&self) {
        self.shared.commands.push(TransportCmd::Stop);
    }

    pub fn seek(&self, beat: f64) {
        self.shared.commands.push(TransportCmd::Seek(beat));
    }

    pub fn all_notes_off(&self) {
        self.shared.commands.push(TransportCmd::AllNotesOff);
    }

    pub fn set_bpm(&self, bpm: f32) {
        self.shared.commands.push(TransportCmd::SetBpm(bpm));
    }

    pub fn set_loop(&self, start: f64, end: f64) {
        self.shared
            .pending_loop
            .store(Some(Arc::new(LoopRegion::new(start, end))));
    }

    pub fn disable_loop(&self) {
        self.shared
            .pending_loop
            .store(Some(Arc::new(LoopRegion::disabled())));
    }

    pub fn current_beat(&self) -> f64 {
        self.shared.clock.beat()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.clock.is_playing()
    }

    pub fn bpm(&self) -> f32 {
        self.shared.clock.bpm()
    }

    // ------------------------------------------------------------------
    // Parameters, preview, live node access
    // ------------------------------------------------------------------

    /// Forward a parameter write to the active graph, if any. Unknown node
    /// or parameter names are silent no-ops.
    pub fn set_param(&self, node_id: &str, param: &str, value: f32) {
        if let Some(graph) = self.shared.active_graph.load_full() {
            graph.set_param(node_id, param, value);
        }
    }

    /// Inject a preview note, bypassing schedule and transport. An empty
    /// `node_id` targets the first track source in evaluation order.
    pub fn preview_note_on(&self, node_id: &str, channel: u8, pitch: u8, velocity: u8) {
        if let Some(graph) = self.shared.active_graph.load_full() {
            if let Some(index) = graph.preview_target(node_id) {
                graph.preview_note_on(index, channel, pitch, velocity);
            }
        }
    }

    pub fn preview_note_off(&self, node_id: &str, channel: u8, pitch: u8) {
        if let Some(graph) = self.shared.active_graph.load_full() {
            if let Some(index) = graph.preview_target(node_id) {
                graph.preview_note_off(index, channel, pitch);
            }
        }
    }

    /// Silence preview notes on the addressed track source, or on every
    /// track source when `node_id` is empty.
    pub fn preview_all_notes_off(&self, node_id: &str) {
        let Some(graph) = self.shared.active_graph.load_full() else {
            return;
        };
        if node_id.is_empty() {
            graph.preview_all_sources_off();
        } else if let Some(index) = graph.preview_target(node_id) {
            graph.preview_all_notes_off(index);
        }
    }

    pub fn set_node_config(&self, node_id: &str, config_json: &str) -> Result<(), EngineError> {
        let graph = self
            .shared
            .active_graph
            .load_full()
            .ok_or(EngineError::NoGraph)?;
        let config: serde_json::Value = serde_json::from_str(config_json)
            .map_err(|err| EngineError::Config(format!("config JSON error: {err}")))?;
        graph.set_node_config(node_id, &config)
    }

    pub fn get_node_data(&self, node_id: &str, port_id: &str) -> Result<String, EngineError> {
        let graph = self
            .shared
            .active_graph
            .load_full()
            .ok_or(EngineError::NoGraph)?;
        graph.get_node_data(node_id, port_id)
    }

    pub fn set_node_data(
        &self,
        node_id: &str,
        port_id: &str,
        json: &str,
    ) -> Result<(), EngineError> {
        let graph = self
            .shared
            .active_graph
            .load_full()
            .ok_or(EngineError::NoGraph)?;
        graph.set_node_data(node_id, port_id, json)
    }

    pub fn read_monitor(&self, node_id: &str, port_id: &str) -> Result<f32, EngineError> {
        let graph = self
            .shared
            .active_graph
            .load_full()
            .ok_or(EngineError::NoGraph)?;
        graph.read_monitor(node_id, port_id)
    }

    pub(crate) fn shared(&self) -> &Arc<EngineShared> {
        &self.shared
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.close();
    }
}

/// The per-block renderer driven by the stream backend. One instance lives
/// inside the callback handle; all its state is audio-thread private apart
/// from `shared`.
pub(crate) struct EngineCallback {
    cfg: EngineConfig,
    shared: Arc<EngineShared>,
    active_loop: Option<LoopRegion>,
    drained: Vec<TransportCmd>,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
}

impl EngineCallback {
    pub fn new(cfg: EngineConfig, shared: Arc<EngineShared>) -> Self {
        let block = cfg.block_size.max(1);
        Self {
            cfg,
            shared,
            active_loop: None,
            drained: Vec::new(),
            scratch_l: vec![0.0; block],
            scratch_r: vec![0.0; block],
        }
    }

    /// Process one engine block into the stereo scratch buffers.
    fn process_block(&mut self, frames: usize) {
        let shared = self.shared.clone();

        // 1. Drain pending commands under a short lock and apply them.
        shared.commands.drain_into(&mut self.drained);
        let graph = shared.active_graph.load_full();
        for &cmd in self.drained.iter() {
            match cmd {
                TransportCmd::Play => shared.clock.set_playing(true),
                TransportCmd::Stop => {
                    shared.clock.set_playing(false);
                    if let Some(graph) = graph.as_deref() {
                        graph.all_notes_off();
                    }
                }
                TransportCmd::Seek(beat) => {
                    shared.dispatcher.seek(beat);
                    shared.clock.set_beat(beat);
                    if let Some(graph) = graph.as_deref() {
                        graph.all_notes_off();
                    }
                }
                TransportCmd::AllNotesOff => {
                    if let Some(graph) = graph.as_deref() {
                        graph.all_notes_off();
                    }
                }
                TransportCmd::SetBpm(bpm) => shared.clock.set_bpm(bpm.max(1.0)),
            }
        }

        // 2. Exchange the pending loop slot.
        if let Some(region) = shared.pending_loop.swap(None) {
            self.active_loop = Some(*region);
        }

        // 3. Pending schedule swap.
        let retired_schedule = shared.dispatcher.check_pending();
        drop(retired_schedule); // engine holds a strong ref; not the last drop

        let bpm = shared.clock.bpm();
        let beats_per_sample = bpm as f64 / 60.0 / self.cfg.sample_rate as f64;
        let beat = shared.clock.beat();

        // 4/5. Load the graph; without one, or when stopped, still run the
        // graph at the current beat so preview notes keep sounding, but do
        // not advance the transport.
        let Some(graph) = graph else {
            self.scratch_l[..frames].fill(0.0);
            self.scratch_r[..frames].fill(0.0);
            shared.epoch.advance();
            return;
        };

        if !shared.clock.is_playing() {
            let ctx = ProcessContext {
                block_size: frames,
                sample_rate: self.cfg.sample_rate,
                bpm,
                beat_position: beat,
                beats_per_sample,
            };
            graph.process(&ctx);
            self.copy_graph_output(&graph, frames);
            shared.epoch.advance();
            return;
        }

        // 6. Dispatch this block's events and evaluate the graph.
        let end_beat = beat + frames as f64 * beats_per_sample;
        shared.dispatcher.dispatch(beat, end_beat, &graph);

        let ctx = ProcessContext {
            block_size: frames,
            sample_rate: self.cfg.sample_rate,
            bpm,
            beat_position: beat,
            beats_per_sample,
        };
        graph.process(&ctx);
        self.copy_graph_output(&graph, frames);

        // 7. Publish the advanced beat position.
        shared.clock.set_beat(end_beat);

        // 8. Loop wrap-around, then end-of-arrangement.
        let arrangement = shared.dispatcher.arrangement_length();
        if let Some(region) = self.active_loop.filter(|r| r.is_active()) {
            if end_beat >= region.end {
                shared.dispatcher.seek(region.start);
                shared.clock.set_beat(region.start);
            }
        } else if arrangement > 0.0 && end_beat >= arrangement {
            shared.clock.set_playing(false);
            graph.all_notes_off();
            shared.clock.set_beat(0.0);
        }

        // 9. Mark the block complete for graph retirement tracking.
        shared.epoch.advance();
    }

    fn copy_graph_output(&mut self, graph: &Graph, frames: usize) {
        let left = &mut self.scratch_l[..frames];
        let right = &mut self.scratch_r[..frames];
        if !graph.copy_output(left, right) {
            left.fill(0.0);
            right.fill(0.0);
        }
    }
}

impl AudioCallback for EngineCallback {
    fn render(&mut self, output: &mut [f32], frames: usize) {
        let mut done = 0usize;
        while done < frames {
            let n = (frames - done).min(self.cfg.block_size);
            self.process_block(n);
            for i in 0..n {
                output[(done + i) * 2] = self.scratch_l[i];
                output[(done + i) * 2 + 1] = self.scratch_r[i];
            }
            done += n;
        }
    }
}
