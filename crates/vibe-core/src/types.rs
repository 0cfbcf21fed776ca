//! Common types for Vibe
//!
//! Fundamental audio types shared by the engine, the orchestrator and the
//! output backend: decoded source PCM, the planar output block and the
//! speed/pitch conversions used by the stretcher.

/// Audio sample type (32-bit float, planar)
pub type Sample = f32;

/// Smallest time ratio handed to the stretcher (20x speed)
pub const MIN_TIME_RATIO: f64 = 0.05;

/// Largest time ratio handed to the stretcher (0.05x speed)
pub const MAX_TIME_RATIO: f64 = 20.0;

/// Frames produced per render callback when the host does not dictate a size
pub const DEFAULT_OUTPUT_BLOCK_SIZE: usize = 128;

/// Per-channel capacity of the foreign exchange buffers, in frames
///
/// Must cover the largest per-callback input demand:
/// `ceil(block / MIN_TIME_RATIO) + latency + padding`.
pub const DEFAULT_BLOCK_CAPACITY: usize = 16384;

/// Extra input frames fed on top of the computed demand
pub const INPUT_PADDING_FRAMES: usize = 4;

/// Target cadence of time updates sent to the UI
pub const DEFAULT_TIME_UPDATE_HZ: f64 = 15.0;

/// Convert a playback speed into the stretcher's time ratio (output / input duration)
#[inline]
pub fn speed_to_time_ratio(speed: f64) -> f64 {
    (1.0 / speed).clamp(MIN_TIME_RATIO, MAX_TIME_RATIO)
}

/// Convert a pitch shift in semitones into a frequency scale factor
#[inline]
pub fn semitones_to_pitch_scale(semitones: f64) -> f64 {
    2f64.powf(semitones / 12.0)
}

/// Convert a frequency scale factor back into semitones
#[inline]
pub fn pitch_scale_to_semitones(scale: f64) -> f64 {
    if scale > 0.0 {
        12.0 * scale.log2()
    } else {
        0.0
    }
}

/// Decoded PCM handed to the player on load
///
/// One `Vec` per channel, all of equal length. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct SourceAudio {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Planar channel data
    pub channels: Vec<Vec<Sample>>,
}

impl SourceAudio {
    pub fn new(sample_rate: u32, channels: Vec<Vec<Sample>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Number of channels
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (length of the first channel)
    #[inline]
    pub fn total_frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames() as f64 / self.sample_rate as f64
    }

    /// Whether every channel has the same length
    pub fn is_rectangular(&self) -> bool {
        let frames = self.total_frames();
        self.channels.iter().all(|c| c.len() == frames)
    }
}

/// A pre-allocated planar block of output audio
///
/// The render loop writes one block per callback. The working length is set
/// from the pre-allocated capacity so that the callback never allocates.
#[derive(Debug, Clone)]
pub struct PlanarBuffer {
    channels: Vec<Vec<Sample>>,
    len: usize,
    capacity: usize,
}

impl PlanarBuffer {
    /// Create a silent buffer with `channels` channels of `capacity` frames
    pub fn with_capacity(channels: usize, capacity: usize) -> Self {
        Self {
            channels: vec![vec![0.0; capacity]; channels],
            len: capacity,
            capacity,
        }
    }

    /// Number of channels
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Working length in frames
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pre-allocated capacity in frames
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set the working length (real-time safe, clamped to capacity)
    #[inline]
    pub fn set_len_from_capacity(&mut self, len: usize) {
        debug_assert!(len <= self.capacity, "set_len_from_capacity called with len > capacity");
        self.len = len.min(self.capacity);
    }

    /// Get one channel's working region
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index][..self.len]
    }

    /// Get one channel's working region mutably
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        let len = self.len;
        &mut self.channels[index][..len]
    }

    /// Fill the working region with silence
    pub fn fill_silence(&mut self) {
        self.fill_silence_from(0);
    }

    /// Zero-pad every channel from `offset` to the working length
    pub fn fill_silence_from(&mut self, offset: usize) {
        let len = self.len;
        if offset >= len {
            return;
        }
        for channel in &mut self.channels {
            channel[offset..len].fill(0.0);
        }
    }

    /// Whether any sample in the working region is non-zero
    pub fn is_silent(&self) -> bool {
        self.channels
            .iter()
            .all(|c| c[..self.len].iter().all(|s| *s == 0.0))
    }

    /// Interleave into a device buffer with `device_channels` channels
    ///
    /// Device channel `d` receives buffer channel `d % channel_count`, so a
    /// mono block is duplicated to every output. Writes `min(len, frames)` frames
    /// and silences the remainder of `output`.
    pub fn write_interleaved(&self, output: &mut [Sample], device_channels: usize) {
        if device_channels == 0 {
            return;
        }
        let written = self.write_interleaved_from(0, output, device_channels);
        output[written * device_channels..].fill(0.0);
    }

    /// Interleave frames `offset..len` into the front of `output`
    ///
    /// Stops when either side runs out and returns the frames written; the
    /// rest of `output` is left untouched.
    pub fn write_interleaved_from(
        &self,
        offset: usize,
        output: &mut [Sample],
        device_channels: usize,
    ) -> usize {
        if device_channels == 0 || self.channels.is_empty() || offset >= self.len {
            return 0;
        }
        let source_channels = self.channels.len();
        let frames = (self.len - offset).min(output.len() / device_channels);
        for (i, frame) in output
            .chunks_exact_mut(device_channels)
            .take(frames)
            .enumerate()
        {
            for (d, out) in frame.iter_mut().enumerate() {
                *out = self.channels[d % source_channels][offset + i];
            }
        }
        frames
    }
}
