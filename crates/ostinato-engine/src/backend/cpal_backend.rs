//! cpal-backed output stream.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use ostinato_rt::CallbackHandle;

use super::{AudioBackend, StreamConfig};

#[derive(Default)]
pub struct CpalBackend {
    stream: Option<cpal::Stream>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for CpalBackend {
    fn start(&mut self, config: &StreamConfig, callback: CallbackHandle) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = match config.output_device {
            Some(index) => host
                .output_devices()
                .context("enumerating output devices")?
                .nth(index)
                .ok_or_else(|| anyhow!("output device {index} not available"))?,
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("no output device found"))?,
        };

        let stream_config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(config.sample_rate as u32),
            buffer_size: cpal::BufferSize::Fixed(config.block_size as u32),
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / 2;
                    callback.render(data, frames);
                },
                |err| tracing::warn!(%err, "output stream error"),
                None,
            )
            .context("opening output stream")?;
        stream.play().context("starting output stream")?;
        self.stream = Some(stream);

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "<unnamed>".into()),
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            "output stream running"
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.stream = None;
    }
}
