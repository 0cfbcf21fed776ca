//! CPAL output stream
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control thread  │───push()───────────►│   Command Queue     │
//! │  (orchestrator)  │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ events, retired sessions                  ▼
//!         │                                ┌─────────────────────┐
//!         └────────────────────────────────│  CPAL Audio Thread  │
//!                                          │  (owns RenderLoop)  │
//!                                          └─────────────────────┘
//! ```
//!
//! The device buffer size is whatever the host hands the callback. The render
//! loop always produces fixed-size blocks, so the callback slices device
//! buffers into blocks and carries the unplayed tail of a block over to the
//! next callback.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use crate::engine::RenderLoop;
use crate::types::{PlanarBuffer, Sample};

use super::config::AudioConfig;
use super::device::{default_output_device, find_device_by_id};
use super::error::{AudioError, AudioResult};

/// Keeps the output stream alive; drop it to stop audio
///
/// The render loop lives inside the stream callback and is dropped with it.
pub struct OutputHandle {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
    buffer_size: u32,
}

impl OutputHandle {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Negotiated device sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device channel count
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Requested buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Open the configured device and start rendering into it
///
/// `sample_rate` is the rate of the loaded source; when the device cannot
/// run at it, the closest supported rate is used and reported by the handle.
pub fn start_output(
    config: &AudioConfig,
    sample_rate: u32,
    render: RenderLoop,
) -> AudioResult<OutputHandle> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => default_output_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported, buffer_size) = get_output_config(&device, config, sample_rate)?;
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    let device_rate = stream_config.sample_rate.0;

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency), render block {} frames",
        stream_config.channels,
        device_rate,
        buffer_size,
        (buffer_size as f32 / device_rate as f32) * 1000.0,
        render.block_size()
    );

    let state = AudioCallbackState::new(render, stream_config.channels as usize);
    let stream = build_output_stream(&device, &stream_config, state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started");

    Ok(OutputHandle {
        _stream: stream,
        device_name,
        sample_rate: device_rate,
        channels: stream_config.channels,
        buffer_size,
    })
}

/// State owned by the output callback
struct AudioCallbackState {
    render: RenderLoop,
    /// Pre-allocated render block, one channel per device channel
    block: PlanarBuffer,
    /// Frames of `block` already written to the device
    read_offset: usize,
    device_channels: usize,
}

impl AudioCallbackState {
    fn new(render: RenderLoop, device_channels: usize) -> Self {
        let block_size = render.block_size();
        let device_channels = device_channels.max(1);
        let mut block = PlanarBuffer::with_capacity(device_channels, block_size);
        block.set_len_from_capacity(block_size);
        Self {
            render,
            block,
            read_offset: block_size,
            device_channels,
        }
    }

    /// Fill an interleaved device buffer (real-time safe)
    fn fill(&mut self, data: &mut [Sample]) {
        let channels = self.device_channels;
        let frames = data.len() / channels;
        let mut frame = 0;
        while frame < frames {
            if self.read_offset >= self.block.len() {
                self.render.render(&mut self.block);
                self.read_offset = 0;
            }
            let written =
                self.block
                    .write_interleaved_from(self.read_offset, &mut data[frame * channels..], channels);
            self.read_offset += written;
            frame += written;
        }
        data[frames * channels..].fill(0.0);
    }
}

/// Pick an f32 config that supports `sample_rate`
///
/// Returns (SupportedStreamConfig, buffer size in frames).
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
    sample_rate: u32,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0
    };

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .find(|c| c.channels() >= 2 && in_range(c))
        .or_else(|| {
            supported_configs
                .iter()
                .filter(|c| c.sample_format() == SampleFormat::F32)
                .find(|c| in_range(c))
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| {
            AudioError::ConfigError("No f32 output configuration available".to_string())
        })?;

    let rate = if in_range(best_config) {
        cpal::SampleRate(sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (playback speed will be off by {:.3}x)",
            sample_rate,
            fallback.0,
            fallback.0 as f64 / sample_rate.max(1) as f64
        );
        fallback
    };

    let buffer_size = config.buffer_size.as_frames();
    log::debug!(
        "Selected buffer size: {} frames for {:?}",
        buffer_size,
        config.buffer_size
    );
    Ok((best_config.clone().with_sample_rate(rate), buffer_size))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut state: AudioCallbackState,
) -> AudioResult<Stream> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                state.fill(data);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
