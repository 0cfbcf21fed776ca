//! StretchEngine - one stretcher handle plus its foreign buffers
//!
//! Owns the native handle for a loaded session. Parameter changes are applied
//! live; `reset` is only needed after discontinuities (seek, pause/resume,
//! first play) and clears ratio and pitch back to the library defaults, so the
//! caller reapplies them right after.

use std::ffi::{c_int, c_uint};
use std::sync::Arc;

use crate::error::{InitializationError, ProcessingError};
use crate::stretch::{RawStretcher, StretchLibrary, StretchOptions};
use crate::types::{semitones_to_pitch_scale, speed_to_time_ratio, MAX_TIME_RATIO, MIN_TIME_RATIO};

use super::buffer_pool::{ChannelBufferSet, NativeBufferPool};

/// Stretcher instance for one session
pub struct StretchEngine {
    library: Arc<dyn StretchLibrary>,
    pool: NativeBufferPool,
    handle: *mut RawStretcher,
    buffers: ChannelBufferSet,
    sample_rate: u32,
    channels: usize,
    time_ratio: f64,
    pitch_scale: f64,
    /// Frames written into the output buffers by the last retrieve
    retrieved: usize,
}

// SAFETY: the handle and buffers are exclusively owned by this engine and the
// library is Send + Sync; the engine moves between the control and render
// threads but is only ever used by one of them at a time.
unsafe impl Send for StretchEngine {}

impl StretchEngine {
    /// Create the native handle and allocate `2 x channel_count` buffers
    ///
    /// The handle starts at `time_ratio = 1 / initial_speed` and
    /// `pitch_scale = 2^(initial_pitch / 12)`. If buffer allocation fails the
    /// handle is deleted before returning.
    pub fn initialize(
        pool: &NativeBufferPool,
        sample_rate: u32,
        channel_count: usize,
        block_capacity: usize,
        options: StretchOptions,
        initial_speed: f64,
        initial_pitch_semitones: f64,
    ) -> Result<Self, InitializationError> {
        if sample_rate == 0 {
            return Err(InitializationError::InvalidSampleRate(sample_rate));
        }
        if channel_count == 0 || channel_count > c_uint::MAX as usize {
            return Err(InitializationError::InvalidChannelCount(channel_count));
        }

        let library = pool.library().clone();
        let time_ratio = speed_to_time_ratio(initial_speed);
        let pitch_scale = semitones_to_pitch_scale(initial_pitch_semitones);

        let handle = library.create(
            sample_rate as c_uint,
            channel_count as c_uint,
            options,
            time_ratio,
            pitch_scale,
        );
        if handle.is_null() {
            return Err(InitializationError::CreateFailed {
                sample_rate,
                channels: channel_count,
            });
        }

        let buffers = match pool.allocate_channel_buffers(channel_count, block_capacity) {
            Ok(buffers) => buffers,
            Err(e) => {
                // SAFETY: handle was just created by this library and is not shared.
                unsafe { library.delete(handle) };
                return Err(e.into());
            }
        };

        log::debug!(
            "StretchEngine initialized: {} channels @ {}Hz, ratio {:.3}, pitch scale {:.3}",
            channel_count,
            sample_rate,
            time_ratio,
            pitch_scale
        );

        Ok(Self {
            library,
            pool: pool.clone(),
            handle,
            buffers,
            sample_rate,
            channels: channel_count,
            time_ratio,
            pitch_scale,
            retrieved: 0,
        })
    }

    /// Whether the native handle is live
    #[inline]
    pub fn is_ready(&self) -> bool {
        !self.handle.is_null()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Per-channel capacity of the exchange buffers in frames
    #[inline]
    pub fn block_capacity(&self) -> usize {
        self.buffers.block_capacity()
    }

    /// Number of foreign channel buffers held
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.buffer_count()
    }

    /// Last applied time ratio
    #[inline]
    pub fn ratio(&self) -> f64 {
        self.time_ratio
    }

    /// Last applied pitch scale
    #[inline]
    pub fn pitch_scale(&self) -> f64 {
        self.pitch_scale
    }

    /// The raw handle, for diagnostics
    #[inline]
    pub fn raw_handle(&self) -> *mut RawStretcher {
        self.handle
    }

    /// Apply a new time ratio live, clamped to `[MIN_TIME_RATIO, MAX_TIME_RATIO]`
    pub fn set_ratio(&mut self, ratio: f64) {
        self.time_ratio = ratio.clamp(MIN_TIME_RATIO, MAX_TIME_RATIO);
        if self.is_ready() {
            // SAFETY: live handle from this library.
            unsafe { self.library.set_time_ratio(self.handle, self.time_ratio) };
        }
    }

    /// Apply a new pitch scale live
    pub fn set_pitch_scale(&mut self, scale: f64) {
        self.pitch_scale = scale;
        if self.is_ready() {
            // SAFETY: live handle from this library.
            unsafe { self.library.set_pitch_scale(self.handle, scale) };
        }
    }

    /// Clear the stretcher's internal state
    ///
    /// The library forgets ratio and pitch; reapply them immediately after.
    pub fn reset(&mut self) {
        self.retrieved = 0;
        if self.is_ready() {
            // SAFETY: live handle from this library.
            unsafe { self.library.reset(self.handle) };
        }
    }

    /// Frames ready for retrieval (0 without a handle, -1 once fully drained)
    pub fn query_available(&self) -> i32 {
        if !self.is_ready() {
            return 0;
        }
        // SAFETY: live handle from this library.
        unsafe { self.library.available(self.handle) }
    }

    /// Start delay of the stretcher in frames
    pub fn latency(&self) -> usize {
        if !self.is_ready() {
            return 0;
        }
        // SAFETY: live handle from this library.
        unsafe { self.library.get_latency(self.handle).max(0) as usize }
    }

    /// Feed `frames` frames of `source` starting at `offset`
    ///
    /// At most `block_capacity` frames are sent; channels shorter than the
    /// request are zero-padded. The native call receives exactly the clamped
    /// frame count and the final flag.
    pub fn process<S: AsRef<[f32]>>(
        &mut self,
        source: &[S],
        offset: usize,
        frames: usize,
        is_final: bool,
    ) -> Result<(), ProcessingError> {
        if !self.is_ready() {
            return Err(ProcessingError::NotInitialized);
        }
        let frames = frames.min(self.buffers.block_capacity());

        for ch in 0..self.channels {
            let input = &mut self.buffers.input_mut(ch)[..frames];
            let samples = source
                .get(ch)
                .map_or(&[][..], |s| s.as_ref())
                .get(offset..)
                .unwrap_or(&[]);
            let copied = samples.len().min(frames);
            input[..copied].copy_from_slice(&samples[..copied]);
            input[copied..].fill(0.0);
        }

        // SAFETY: live handle; the pointer array holds `channels` buffers of
        // `block_capacity >= frames` floats.
        let status = unsafe {
            self.library.process(
                self.handle,
                self.buffers.input_pointers(),
                frames as c_uint,
                is_final as c_int,
            )
        };
        if status < 0 {
            return Err(ProcessingError::ProcessFailed(status));
        }
        Ok(())
    }

    /// Retrieve up to `min(available, max_frames, block_capacity)` frames
    ///
    /// Returns the number of frames now in the output buffers (0 when the
    /// stretcher has nothing ready). Read them with [`Self::retrieved_channel`].
    pub fn retrieve(&mut self, max_frames: usize) -> Result<usize, ProcessingError> {
        self.retrieved = 0;
        let available = self.query_available();
        if available <= 0 || max_frames == 0 {
            return Ok(0);
        }
        let frames = (available as usize)
            .min(max_frames)
            .min(self.buffers.block_capacity());

        // SAFETY: live handle; the pointer array holds `channels` buffers of
        // `block_capacity >= frames` floats.
        let got = unsafe {
            self.library
                .retrieve(self.handle, self.buffers.output_pointers(), frames as c_uint)
        };
        if got < 0 {
            return Err(ProcessingError::RetrieveFailed(got));
        }
        self.retrieved = (got as usize).min(frames);
        Ok(self.retrieved)
    }

    /// Samples of one channel produced by the last retrieve
    #[inline]
    pub fn retrieved_channel(&self, channel: usize) -> &[f32] {
        self.buffers.output(channel, self.retrieved)
    }

    /// Delete the native handle and free the buffers; safe to call repeatedly
    pub fn teardown(&mut self) {
        if !self.handle.is_null() {
            // SAFETY: live handle from this library, nulled right after.
            unsafe { self.library.delete(self.handle) };
            self.handle = std::ptr::null_mut();
            log::debug!("StretchEngine torn down");
        }
        self.retrieved = 0;
        self.pool.free(&mut self.buffers);
    }
}

impl Drop for StretchEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
