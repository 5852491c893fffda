//! Transport state shared between the control thread and the audio callback.
//!
//! Beat position and the playing flag are plain atomics: the audio thread is
//! the only writer during playback, the control thread reads them for
//! position queries and writes them on seek.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Musical transport clock. The beat position is stored as `f64` bits in an
/// `AtomicU64` so both threads can read it without locking.
#[derive(Debug)]
pub struct BeatClock {
    beat_bits: AtomicU64,
    bpm_bits: AtomicU32,
    playing: AtomicBool,
}

impl BeatClock {
    pub fn new(bpm: f32) -> Self {
        Self {
            beat_bits: AtomicU64::new(0f64.to_bits()),
            bpm_bits: AtomicU32::new(bpm.to_bits()),
            playing: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn beat(&self) -> f64 {
        f64::from_bits(self.beat_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_beat(&self, beat: f64) {
        self.beat_bits.store(beat.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn bpm(&self) -> f32 {
        f32::from_bits(self.bpm_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_bpm(&self, bpm: f32) {
        self.bpm_bits.store(bpm.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    /// Beats advanced by one sample at the current tempo.
    #[inline]
    pub fn beats_per_sample(&self, sample_rate: f32) -> f64 {
        self.bpm() as f64 / 60.0 / sample_rate as f64
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(120.0)
    }
}

/// A loop region in beats. `enabled == false` disables looping regardless of
/// the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
    pub enabled: bool,
}

impl LoopRegion {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            start: 0.0,
            end: 0.0,
            enabled: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.end > self.start
    }
}

/// Monotonic counter advanced by the audio thread at the end of every
/// processed block. The control thread compares observations of it to decide
/// when a retiring graph can no longer be referenced by the callback.
#[derive(Debug, Default)]
pub struct GraphEpoch(AtomicU64);

impl GraphEpoch {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Audio thread, once per block.
    #[inline]
    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::Release);
    }

    /// Control thread.
    #[inline]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_clock_round_trips_position() {
        let clock = BeatClock::new(140.0);
        clock.set_beat(3.25);
        assert_eq!(clock.beat(), 3.25);
        assert_eq!(clock.bpm(), 140.0);
        assert!(!clock.is_playing());
        clock.set_playing(true);
        assert!(clock.is_playing());
    }

    #[test]
    fn beats_per_sample_matches_tempo() {
        let clock = BeatClock::new(120.0);
        let bps = clock.beats_per_sample(44_100.0);
        // 120 bpm = 2 beats per second.
        assert!((bps * 44_100.0 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn loop_region_activity() {
        assert!(LoopRegion::new(0.0, 4.0).is_active());
        assert!(!LoopRegion::disabled().is_active());
        assert!(!LoopRegion::new(4.0, 4.0).is_active());
    }
}
