//! Stream abstraction: the engine's only coupling to audio drivers.
//!
//! A backend opens a two-channel 32-bit float output at the configured
//! sample rate and block size, then drives the supplied callback handle
//! once per hardware buffer. Concrete driver selection lives behind this
//! trait; the default implementation uses cpal.

use anyhow::Result;

use ostinato_rt::CallbackHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    pub sample_rate: f32,
    pub block_size: usize,
    /// Driver-specific output device index; `None` selects the default.
    pub output_device: Option<usize>,
}

pub trait AudioBackend {
    fn start(&mut self, config: &StreamConfig, callback: CallbackHandle) -> Result<()>;
    fn stop(&mut self);
}

#[cfg(feature = "cpal")]
mod cpal_backend;

#[cfg(feature = "cpal")]
pub use cpal_backend::CpalBackend;
