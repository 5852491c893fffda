//! Beat-timed event schedule and the per-block dispatcher.
//!
//! A schedule is an immutable, sorted event list built on the control
//! thread and handed to the dispatcher through an atomic pending slot. The
//! audio thread takes pending swaps at the top of each block and walks the
//! cursor forward as blocks advance.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ScheduleError;
use crate::graph::{Graph, GraphEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    /// pitch = program, velocity = bank.
    Program,
    /// pitch = volume.
    Volume,
    /// 14-bit bend split across pitch (low 7) and velocity (high 7).
    Bend,
    /// value = normalized 0..1, delivered via `push_control`.
    Control,
}

impl EventKind {
    fn parse(text: &str) -> Result<Self, ScheduleError> {
        Ok(match text {
            "note_on" => EventKind::NoteOn,
            "note_off" => EventKind::NoteOff,
            "program" => EventKind::Program,
            "volume" => EventKind::Volume,
            "bend" => EventKind::Bend,
            "control" => EventKind::Control,
            other => return Err(ScheduleError::UnknownEventType(other.to_owned())),
        })
    }

    /// Sort priority at equal beats: note-ons fire after everything else so
    /// same-beat off/program/volume/bend/control events settle first.
    fn priority(self) -> u8 {
        match self {
            EventKind::NoteOn => 2,
            _ => 1,
        }
    }
}

/// JSON event batch submitted by the control process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatchDesc {
    #[serde(default)]
    pub events: Vec<EventDesc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDesc {
    #[serde(default)]
    pub beat: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub channel: u8,
    #[serde(default)]
    pub pitch: u8,
    #[serde(default)]
    pub velocity: u8,
    #[serde(default)]
    pub value: f32,
}

#[derive(Debug, Clone)]
pub struct SchedEvent {
    pub beat: f64,
    pub kind: EventKind,
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub value: f32,
    pub node_id: String,
}

/// Immutable sorted event stream. Sort key is `(beat, priority)` with a
/// stable tie-break; `total_length_beats` is the maximum event beat.
#[derive(Debug)]
pub struct Schedule {
    events: Vec<SchedEvent>,
    total_length: f64,
}

impl Schedule {
    pub fn from_json(json: &str) -> Result<Self, ScheduleError> {
        let desc: EventBatchDesc = serde_json::from_str(json)?;
        Self::from_desc(&desc)
    }

    pub fn from_desc(desc: &EventBatchDesc) -> Result<Self, ScheduleError> {
        let mut events = Vec::with_capacity(desc.events.len());
        let mut total_length = 0.0f64;

        for event in &desc.events {
            let kind = EventKind::parse(&event.event_type)?;
            // Setup events arrive with beat < 0 (program/volume changes
            // that must fire before any note-on). Clamp to zero so they
            // fire at the start of the arrangement instead of being
            // skipped.
            let beat = event.beat.max(0.0);
            if beat > total_length {
                total_length = beat;
            }
            events.push(SchedEvent {
                beat,
                kind,
                channel: event.channel,
                pitch: event.pitch,
                velocity: event.velocity,
                value: event.value,
                node_id: event.node_id.clone(),
            });
        }

        events.sort_by(|a, b| {
            a.beat
                .partial_cmp(&b.beat)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.kind.priority().cmp(&b.kind.priority()))
        });

        Ok(Self {
            events,
            total_length,
        })
    }

    pub fn events(&self) -> &[SchedEvent] {
        &self.events
    }

    pub fn total_length_beats(&self) -> f64 {
        self.total_length
    }
}

#[derive(Default)]
struct DispatchState {
    current: Option<Arc<Schedule>>,
    idx: usize,
}

/// Owns the current schedule pointer, the block cursor, and the pending
/// swap slot. `swap_schedule` is the control-thread entry point; the audio
/// thread crosses pending swaps via `check_pending` at the top of each
/// block. `check_pending` is idempotent once the slot is empty, so the
/// control thread may also call it right after a swap to make the new
/// schedule observable immediately.
pub struct Dispatcher {
    pending: ArcSwapOption<Schedule>,
    state: Mutex<DispatchState>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            pending: ArcSwapOption::from(None),
            state: Mutex::new(DispatchState::default()),
        }
    }

    /// Atomically place `next` in the pending slot, returning whatever was
    /// pending before (the caller releases it).
    pub fn swap_schedule(&self, next: Arc<Schedule>) -> Option<Arc<Schedule>> {
        self.pending.swap(Some(next))
    }

    /// Take a pending schedule if any, install it as current, and reset the
    /// cursor to the first event. Returns the schedule that was current
    /// before so the caller can release it.
    pub fn check_pending(&self) -> Option<Arc<Schedule>> {
        let taken = self.pending.swap(None)?;
        let mut state = self.state.lock();
        let previous = state.current.replace(taken);
        state.idx = 0;
        previous
    }

    /// Deliver every event with `start_beat <= clamped beat < end_beat` to
    /// its target node. Events addressed to unknown node ids are dropped.
    pub fn dispatch(&self, start_beat: f64, end_beat: f64, graph: &Graph) {
        let mut state = self.state.lock();
        let DispatchState { current, idx } = &mut *state;
        let Some(schedule) = current.as_ref() else {
            return;
        };
        let events = schedule.events();

        while *idx < events.len() {
            let event = &events[*idx];
            let beat = event.beat.max(0.0);
            if beat >= end_beat {
                break;
            }
            if beat >= start_beat {
                let graph_event = match event.kind {
                    EventKind::NoteOn => GraphEvent::NoteOn {
                        channel: event.channel,
                        pitch: event.pitch,
                        velocity: event.velocity,
                    },
                    EventKind::NoteOff => GraphEvent::NoteOff {
                        channel: event.channel,
                        pitch: event.pitch,
                    },
                    EventKind::Program => GraphEvent::Program {
                        channel: event.channel,
                        bank: event.velocity,
                        program: event.pitch,
                    },
                    EventKind::Volume => GraphEvent::Volume {
                        channel: event.channel,
                        volume: event.pitch,
                    },
                    EventKind::Bend => GraphEvent::Bend {
                        channel: event.channel,
                        value: event.pitch as u16 | ((event.velocity as u16) << 7),
                    },
                    EventKind::Control => GraphEvent::Control {
                        beat: event.beat,
                        value: event.value,
                    },
                };
                graph.deliver(&event.node_id, graph_event);
            }
            *idx += 1;
        }
    }

    /// Move the cursor to the first event whose beat is `>= beat`. Linear
    /// scan; schedules are at most thousands of events.
    pub fn seek(&self, beat: f64) {
        let mut state = self.state.lock();
        let DispatchState { current, idx } = &mut *state;
        let Some(schedule) = current.as_ref() else {
            *idx = 0;
            return;
        };
        let events = schedule.events();
        *idx = events
            .iter()
            .position(|event| event.beat >= beat)
            .unwrap_or(events.len());
    }

    /// Current schedule's total length in beats, or 0 with no schedule.
    pub fn arrangement_length(&self) -> f64 {
        self.state
            .lock()
            .current
            .as_ref()
            .map(|schedule| schedule.total_length_beats())
            .unwrap_or(0.0)
    }

    pub fn has_schedule(&self) -> bool {
        self.state.lock().current.is_some()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
