//! Offline rendering: the same graph and schedule driven block-by-block on
//! the control thread, without a sound-card stream.
//!
//! The renderer shares the live dispatcher with the realtime path, so
//! concurrent offline render and live playback is undefined; callers must
//! serialize them.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use ostinato_plugin_sdk::ProcessContext;

use crate::engine::AudioEngine;
use crate::error::EngineError;

impl AudioEngine {
    /// Render the current graph and schedule to interleaved stereo f32 PCM.
    ///
    /// Total duration is `max(arrangement_length, duration_beats) * 60/bpm
    /// + tail_seconds`, rounded up to whole frames.
    pub fn render_offline(
        &self,
        tail_seconds: f32,
        duration_beats: f64,
    ) -> Result<Vec<f32>, EngineError> {
        let shared = self.shared();
        let graph = shared.active_graph.load_full().ok_or(EngineError::NoGraph)?;

        // Pick up a schedule swapped in but not yet crossed, then rewind.
        let retired = shared.dispatcher.check_pending();
        drop(retired);
        shared.dispatcher.seek(0.0);

        let bpm = shared.clock.bpm().max(1.0);
        let length_beats = shared
            .dispatcher
            .arrangement_length()
            .max(duration_beats.max(0.0));
        let total_seconds = length_beats * 60.0 / bpm as f64 + tail_seconds.max(0.0) as f64;
        let total_frames = (total_seconds * self.sample_rate() as f64).ceil() as usize;

        let block = self.block_size();
        let beats_per_sample = bpm as f64 / 60.0 / self.sample_rate() as f64;
        let mut output = Vec::with_capacity(total_frames * 2);
        let mut left = vec![0.0f32; block];
        let mut right = vec![0.0f32; block];

        let mut beat = 0.0f64;
        let mut done = 0usize;
        while done < total_frames {
            let frames = block.min(total_frames - done);
            let end_beat = beat + frames as f64 * beats_per_sample;

            shared.dispatcher.dispatch(beat, end_beat, &graph);

            let ctx = ProcessContext {
                block_size: frames,
                sample_rate: self.sample_rate(),
                bpm,
                beat_position: beat,
                beats_per_sample,
            };
            graph.process(&ctx);

            if !graph.copy_output(&mut left[..frames], &mut right[..frames]) {
                left[..frames].fill(0.0);
                right[..frames].fill(0.0);
            }
            for i in 0..frames {
                output.push(left[i]);
                output.push(right[i]);
            }

            beat = end_beat;
            done += frames;
        }

        Ok(output)
    }

    /// Offline render wrapped in a 16-bit PCM RIFF/WAVE container.
    pub fn render_offline_wav(
        &self,
        tail_seconds: f32,
        duration_beats: f64,
    ) -> Result<Vec<u8>, EngineError> {
        let pcm = self.render_offline(tail_seconds, duration_beats)?;
        encode_wav(&pcm, self.sample_rate() as u32)
    }
}

/// Encode interleaved stereo f32 PCM as a canonical 16-bit WAV file.
pub fn encode_wav(pcm: &[f32], sample_rate: u32) -> Result<Vec<u8>, EngineError> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|err| EngineError::Render(format!("wav writer: {err}")))?;
        for &sample in pcm {
            let quantised = (sample.clamp(-1.0, 1.0) * 32_767.0) as i16;
            writer
                .write_sample(quantised)
                .map_err(|err| EngineError::Render(format!("wav write: {err}")))?;
        }
        writer
            .finalize()
            .map_err(|err| EngineError::Render(format!("wav finalize: {err}")))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn wav_container_round_trips_samples() {
        let pcm = vec![0.0f32, 0.0, 0.5, -0.5, 1.0, -1.0];
        let bytes = encode_wav(&pcm, 44_100).unwrap();

        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, SampleFormat::Int);

        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 6);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[2], (0.5f32 * 32_767.0) as i16);
        assert_eq!(samples[4], 32_767);
        assert_eq!(samples[5], -32_767);
    }
}
