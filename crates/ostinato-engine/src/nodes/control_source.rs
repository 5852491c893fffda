//! Control source: delivers scheduled automation values to connected
//! control ports.

use ostinato_plugin_sdk::ProcessContext;

use crate::node::{PortBuffer, PortDecl};

const RING_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
struct ControlPoint {
    #[allow(dead_code)]
    beat: f64,
    value: f32,
}

/// The dispatcher pushes timestamped values via `push_control` before the
/// node processes; `process` consumes everything queued and outputs the
/// most recent value. The fixed 64-slot ring silently overwrites the oldest
/// entries on overflow.
pub struct ControlSourceNode {
    ring: [ControlPoint; RING_SIZE],
    write_idx: usize,
    read_idx: usize,
    current: f32,
}

impl ControlSourceNode {
    pub fn new() -> Self {
        Self {
            ring: [ControlPoint::default(); RING_SIZE],
            write_idx: 0,
            read_idx: 0,
            current: 0.0,
        }
    }

    pub fn declare_ports(&self) -> Vec<PortDecl> {
        vec![PortDecl::control_out("control_out").with_range(0.0, 0.0, 1.0)]
    }

    pub fn push_control(&mut self, beat: f64, value: f32) {
        self.ring[self.write_idx % RING_SIZE] = ControlPoint { beat, value };
        self.write_idx += 1;
    }

    pub fn process(
        &mut self,
        _ctx: &ProcessContext,
        _inputs: &[PortBuffer],
        outputs: &mut [PortBuffer],
    ) {
        while self.read_idx < self.write_idx {
            self.current = self.ring[self.read_idx % RING_SIZE].value;
            self.read_idx += 1;
        }
        if let Some(out) = outputs.first_mut() {
            out.control = self.current;
        }
    }
}

impl Default for ControlSourceNode {
    fn default() -> Self {
        Self::new()
    }
}
