//! Control-rate plugins: LFO, monitor, and the scheduled control source.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use ostinato_plugin_sdk::{
    ControlHint, Plugin, PluginBuffers, PluginDescriptor, PortDescriptor, PortRole, ProcessContext,
};

const SHAPE_SINE: u8 = 0;
const SHAPE_SQUARE: u8 = 1;
const SHAPE_TRIANGLE: u8 = 2;
const SHAPE_SAW: u8 = 3;

/// Generates a periodic waveform on a control output port. Free-running or
/// synced to the beat grid via the `sync`/`beats` controls.
pub struct ControlLfoPlugin {
    sample_rate: f32,
    phase: f64,
}

impl Default for ControlLfoPlugin {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            phase: 0.0,
        }
    }
}

impl ControlLfoPlugin {
    fn shape_value(shape: u8, phase: f64) -> f32 {
        let phase = phase.rem_euclid(1.0);
        match shape {
            SHAPE_SINE => (0.5 - 0.5 * (phase * std::f64::consts::TAU).cos()) as f32,
            SHAPE_SQUARE => {
                if phase < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            SHAPE_TRIANGLE => {
                if phase < 0.5 {
                    (phase * 2.0) as f32
                } else {
                    ((1.0 - phase) * 2.0) as f32
                }
            }
            SHAPE_SAW => phase as f32,
            _ => 0.0,
        }
    }
}

impl Plugin for ControlLfoPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.control_lfo", "Control LFO", "Utility");
        d.doc = "Generates a periodic waveform on a control output port.".to_owned();
        d.author = "builtin".to_owned();
        d.ports = vec![
            PortDescriptor::control("control_out", "Control Out", PortRole::Output)
                .with_doc("LFO output [0, 1]")
                .with_hint(ControlHint::Meter),
            PortDescriptor::control("frequency", "Frequency", PortRole::Input)
                .with_doc("LFO rate in Hz (free-running mode)")
                .with_range(1.0, 0.01, 100.0),
            PortDescriptor::control("amplitude", "Amplitude", PortRole::Input)
                .with_doc("Peak deviation from offset")
                .with_range(0.5, 0.0, 1.0),
            PortDescriptor::control("offset", "Offset", PortRole::Input)
                .with_doc("DC bias added to the waveform")
                .with_range(0.5, 0.0, 1.0),
            PortDescriptor::control("shape", "Shape", PortRole::Input)
                .with_hint(ControlHint::Categorical)
                .with_range(0.0, 0.0, 3.0)
                .with_step(1.0)
                .with_choices(&["Sine", "Square", "Triangle", "Sawtooth"]),
            PortDescriptor::control("sync", "Sync to BPM", PortRole::Input)
                .with_doc("If 1, period is set by the beats control")
                .with_hint(ControlHint::Toggle)
                .with_range(0.0, 0.0, 1.0),
            PortDescriptor::control("beats", "Period (beats)", PortRole::Input)
                .with_doc("LFO period in beats when synced")
                .with_range(4.0, 0.0625, 64.0),
        ];
        d
    }

    fn activate(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
    }

    fn process(&mut self, ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        let get = |id: &str, fallback: f32| {
            buffers.control.get(id).map(|c| c.value).unwrap_or(fallback)
        };
        let freq = get("frequency", 1.0).max(0.01);
        let amp = get("amplitude", 0.5).clamp(0.0, 1.0);
        let offset = get("offset", 0.5).clamp(0.0, 1.0);
        let shape = (get("shape", 0.0) as i32).clamp(0, 3) as u8;
        let sync = get("sync", 0.0) >= 0.5;
        let beats = get("beats", 4.0).max(0.0625) as f64;

        let phase = if sync {
            // Phase derived from the transport: stateless and coherent
            // across seeks.
            (ctx.beat_position / beats).rem_euclid(1.0)
        } else {
            // Control rate: advance once per block.
            let inc = freq as f64 * ctx.block_size as f64 / self.sample_rate as f64;
            self.phase = (self.phase + inc).rem_euclid(1.0);
            self.phase
        };

        let centred = Self::shape_value(shape, phase) - 0.5;
        let value = (offset + centred * 2.0 * amp).clamp(0.0, 1.0);
        if let Some(out) = buffers.control.get_mut("control_out") {
            out.value = value;
        }
    }
}

const HISTORY_SIZE: usize = 512;

/// Monitors an incoming control stream. The UI samples recent values via
/// `read_monitor` (`latest`, `min`, `max`, `mean`) and can fetch the full
/// history as JSON through `get_graph_data("history")`.
pub struct ControlMonitorPlugin {
    history: Vec<AtomicU32>,
    head: AtomicUsize,
    count: AtomicUsize,
    latest: AtomicU32,
    min: AtomicU32,
    max: AtomicU32,
    mean: AtomicU32,
}

impl Default for ControlMonitorPlugin {
    fn default() -> Self {
        let mut history = Vec::with_capacity(HISTORY_SIZE);
        history.resize_with(HISTORY_SIZE, || AtomicU32::new(0));
        Self {
            history,
            head: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            latest: AtomicU32::new(0),
            min: AtomicU32::new(0),
            max: AtomicU32::new(0),
            mean: AtomicU32::new(0),
        }
    }
}

impl ControlMonitorPlugin {
    fn store(atomic: &AtomicU32, value: f32) {
        atomic.store(value.to_bits(), Ordering::Relaxed);
    }

    fn load(atomic: &AtomicU32) -> f32 {
        f32::from_bits(atomic.load(Ordering::Relaxed))
    }
}

impl Plugin for ControlMonitorPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.control_monitor", "Control Monitor", "Utility");
        d.doc = "Monitors a control stream and exposes rolling statistics to the UI.".to_owned();
        d.author = "builtin".to_owned();
        d.ports = vec![
            PortDescriptor::control("control_in", "Control In", PortRole::Input)
                .with_doc("Control stream to monitor"),
            PortDescriptor::control("latest", "Latest", PortRole::Monitor)
                .with_hint(ControlHint::Meter),
            PortDescriptor::control("min", "Min", PortRole::Monitor).with_hint(ControlHint::Meter),
            PortDescriptor::control("max", "Max", PortRole::Monitor).with_hint(ControlHint::Meter),
            PortDescriptor::control("mean", "Mean", PortRole::Monitor)
                .with_hint(ControlHint::Meter),
        ];
        d
    }

    fn activate(&mut self, _sample_rate: f32, _max_block_size: usize) {
        self.head.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        for slot in &self.history {
            slot.store(0, Ordering::Relaxed);
        }
        Self::store(&self.latest, 0.0);
        Self::store(&self.min, 0.0);
        Self::store(&self.max, 0.0);
        Self::store(&self.mean, 0.0);
    }

    fn process(&mut self, _ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        let value = buffers
            .control
            .get("control_in")
            .map(|c| c.value)
            .unwrap_or(0.0);

        let head = self.head.load(Ordering::Relaxed);
        self.history[head].store(value.to_bits(), Ordering::Relaxed);
        self.head.store((head + 1) % HISTORY_SIZE, Ordering::Relaxed);
        let count = (self.count.load(Ordering::Relaxed) + 1).min(HISTORY_SIZE);
        self.count.store(count, Ordering::Relaxed);

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f32;
        for slot in self.history.iter().take(count) {
            let v = f32::from_bits(slot.load(Ordering::Relaxed));
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }

        Self::store(&self.latest, value);
        Self::store(&self.min, min);
        Self::store(&self.max, max);
        Self::store(&self.mean, sum / count as f32);
    }

    fn read_monitor(&self, port_id: &str) -> f32 {
        match port_id {
            "latest" => Self::load(&self.latest),
            "min" => Self::load(&self.min),
            "max" => Self::load(&self.max),
            "mean" => Self::load(&self.mean),
            _ => 0.0,
        }
    }

    fn get_graph_data(&self, port_id: &str) -> String {
        if port_id != "history" {
            return "{}".to_owned();
        }
        let count = self.count.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        let mut values = Vec::with_capacity(count);
        // Oldest first.
        for i in 0..count {
            let index = (head + HISTORY_SIZE - count + i) % HISTORY_SIZE;
            values.push(f32::from_bits(self.history[index].load(Ordering::Relaxed)));
        }
        let body: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
        format!("[{}]", body.join(","))
    }
}

/// Outputs scheduled control values from sequencer automation lanes.
///
/// The dispatcher pushes values through the node `push_control` hook; the
/// adapter lands them on the (typically unconnected) `control_in` port,
/// and this plugin passes them through to `control_out`.
#[derive(Default)]
pub struct ControlSourcePlugin;

impl Plugin for ControlSourcePlugin {
    fn descriptor(&self) -> PluginDescriptor {
        let mut d = PluginDescriptor::new("builtin.control_source", "Control Source", "Utility");
        d.doc = "Outputs scheduled control values from sequencer automation lanes.".to_owned();
        d.author = "builtin".to_owned();
        d.ports = vec![
            PortDescriptor::control("control_in", "Value", PortRole::Input)
                .with_doc("Scheduled automation value"),
            PortDescriptor::control("control_out", "Control Out", PortRole::Output)
                .with_doc("Automation output"),
        ];
        d
    }

    fn process(&mut self, _ctx: &ProcessContext, buffers: &mut PluginBuffers) {
        let value = buffers
            .control
            .get("control_in")
            .map(|c| c.value)
            .unwrap_or(0.0);
        if let Some(out) = buffers.control.get_mut("control_out") {
            out.value = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_plugin_sdk::ControlPortBuffer;

    fn ctx_at(beat: f64) -> ProcessContext {
        ProcessContext {
            block_size: 128,
            sample_rate: 44_100.0,
            bpm: 120.0,
            beat_position: beat,
            beats_per_sample: 120.0 / 60.0 / 44_100.0,
        }
    }

    #[test]
    fn synced_lfo_tracks_beat_position() {
        let mut lfo = ControlLfoPlugin::default();
        lfo.activate(44_100.0, 128);

        let mut buffers = PluginBuffers::default();
        buffers
            .control
            .insert("control_out".to_owned(), ControlPortBuffer::default());
        buffers
            .control
            .insert("sync".to_owned(), ControlPortBuffer { value: 1.0 });
        buffers
            .control
            .insert("beats".to_owned(), ControlPortBuffer { value: 4.0 });
        buffers
            .control
            .insert("amplitude".to_owned(), ControlPortBuffer { value: 0.5 });
        buffers
            .control
            .insert("offset".to_owned(), ControlPortBuffer { value: 0.5 });

        lfo.process(&ctx_at(0.0), &mut buffers);
        let at_zero = buffers.control.get("control_out").unwrap().value;
        // Sine shape starts at its trough.
        assert!(at_zero < 0.01);

        lfo.process(&ctx_at(2.0), &mut buffers);
        let at_half = buffers.control.get("control_out").unwrap().value;
        assert!(at_half > 0.99, "half period should be at the crest");
    }

    #[test]
    fn monitor_tracks_min_max_and_latest() {
        let mut monitor = ControlMonitorPlugin::default();
        monitor.activate(44_100.0, 128);

        for value in [0.25f32, 0.75, 0.5] {
            let mut buffers = PluginBuffers::default();
            buffers
                .control
                .insert("control_in".to_owned(), ControlPortBuffer { value });
            monitor.process(&ctx_at(0.0), &mut buffers);
        }

        assert!((monitor.read_monitor("latest") - 0.5).abs() < 1e-6);
        assert!((monitor.read_monitor("min") - 0.25).abs() < 1e-6);
        assert!((monitor.read_monitor("max") - 0.75).abs() < 1e-6);
        assert!((monitor.read_monitor("mean") - 0.5).abs() < 1e-6);
        assert_eq!(monitor.get_graph_data("history"), "[0.25,0.75,0.5]");
    }

    #[test]
    fn control_source_passes_through_input() {
        let mut source = ControlSourcePlugin;
        let mut buffers = PluginBuffers::default();
        buffers
            .control
            .insert("control_in".to_owned(), ControlPortBuffer { value: 0.625 });
        buffers
            .control
            .insert("control_out".to_owned(), ControlPortBuffer::default());
        source.process(&ctx_at(0.0), &mut buffers);
        assert_eq!(buffers.control.get("control_out").unwrap().value, 0.625);
    }
}
