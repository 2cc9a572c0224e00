use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

use crate::audio::RawAudio;

/// Audio output controlled by the frame clock.
pub trait AudioSink {
    /// Starts playing the attached audio from its first sample.
    fn start_at_zero(&mut self) -> Result<()>;

    /// Stops playback, rewinds the audio clock to zero and releases the
    /// buffer being played.
    fn stop_and_reset(&mut self);
}

/// Sink that plays nothing. Used for offline rendering, where the encoder
/// muxes the source audio itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn start_at_zero(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_and_reset(&mut self) {}
}

/// Plays decoded audio on the default output device.
pub struct CpalSink {
    audio: Arc<RawAudio>,
    device: cpal::Device,
    config: cpal::StreamConfig,
    stream: Option<cpal::Stream>,
}

impl CpalSink {
    pub fn new(audio: Arc<RawAudio>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No audio output device found")?;

        let config = device
            .default_output_config()
            .context("Failed to get audio output config")?;

        log::info!(
            "Audio output: {} @ {}Hz, {} channels",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate().0,
            config.channels()
        );

        Ok(Self {
            audio,
            device,
            config: config.into(),
            stream: None,
        })
    }
}

impl AudioSink for CpalSink {
    fn start_at_zero(&mut self) -> Result<()> {
        // A fresh stream starts at position zero
        self.stream = None;

        let mut reader = SourceReader::new(
            Arc::clone(&self.audio),
            self.config.sample_rate.0,
            self.config.channels as usize,
        );

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| reader.fill(data),
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .context("Failed to build audio stream")?;

        stream.play().context("Failed to start audio stream")?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop_and_reset(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::warn!("Failed to pause audio stream: {}", err);
            }
        }
    }
}

/// Reads planar source audio as interleaved device frames, resampling by
/// nearest sample. Silence past the end.
struct SourceReader {
    audio: Arc<RawAudio>,
    out_channels: usize,
    step: f64,
    position: f64,
}

impl SourceReader {
    fn new(audio: Arc<RawAudio>, device_rate: u32, out_channels: usize) -> Self {
        let step = audio.sample_rate as f64 / device_rate.max(1) as f64;
        Self {
            audio,
            out_channels: out_channels.max(1),
            step,
            position: 0.0,
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        let channels = &self.audio.channels;
        let len = self.audio.len();

        for frame in data.chunks_mut(self.out_channels) {
            let index = self.position as usize;
            if index >= len || channels.is_empty() {
                frame.fill(0.0);
            } else if self.out_channels == 1 {
                frame[0] = channels.iter().map(|c| c[index]).sum::<f32>() / channels.len() as f32;
            } else {
                for (c, out) in frame.iter_mut().enumerate() {
                    *out = channels[c % channels.len()][index];
                }
            }
            self.position += self.step;
        }
    }
}
