//! Built-in stretch library on top of signalsmith-stretch
//!
//! signalsmith-stretch works block-to-block: the ratio between the input and
//! output slice lengths is the stretch. The engine expects a push/pull
//! library instead (`process` input, poll `available`, `retrieve` output), so
//! each instance keeps an interleaved output FIFO between the two.
//!
//! All scratch space and the FIFO are sized in `create` for the slowest
//! ratio; `process` never grows them and refuses input that would not fit.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::VecDeque;
use std::ffi::{c_int, c_uint, c_void};

use signalsmith_stretch::Stretch;

use super::abi::{
    RawStretcher, StretchLibrary, StretchOptions, OPTION_ENGINE_CHEAPER, STATUS_INVALID,
    STATUS_OK, STATUS_OVERFLOW,
};
use crate::types::{
    pitch_scale_to_semitones, DEFAULT_BLOCK_CAPACITY, MAX_TIME_RATIO, MIN_TIME_RATIO,
};

/// Alignment and size of the header `malloc` stores in front of each block
const HEAP_HEADER: usize = 16;

/// Input frames handed to the stretcher per inner call
const PROCESS_CHUNK_FRAMES: usize = 1024;

/// Output frames one process call may leave pending: a full input block at
/// the slowest ratio plus one more block not yet retrieved
const FIFO_FRAMES: usize =
    DEFAULT_BLOCK_CAPACITY * MAX_TIME_RATIO as usize + DEFAULT_BLOCK_CAPACITY;

/// One stretcher instance behind a `*mut RawStretcher`
struct StretchInstance {
    stretcher: Stretch,
    channels: usize,
    time_ratio: f64,
    pitch_scale: f64,
    /// Fractional output frames carried between process calls
    carry: f64,
    input_scratch: Vec<f32>,
    output_scratch: Vec<f32>,
    /// Interleaved frames waiting to be retrieved
    fifo: VecDeque<f32>,
    /// Final block processed and the stretcher flushed
    finished: bool,
}

impl StretchInstance {
    fn new(sample_rate: u32, channels: usize, options: StretchOptions) -> Self {
        let stretcher = if options & OPTION_ENGINE_CHEAPER != 0 {
            Stretch::preset_cheaper(channels as u32, sample_rate)
        } else {
            Stretch::preset_default(channels as u32, sample_rate)
        };
        let tail_frames = stretcher.output_latency();
        let chunk_output = (PROCESS_CHUNK_FRAMES as f64 * MAX_TIME_RATIO).ceil() as usize + 1;

        Self {
            stretcher,
            channels,
            time_ratio: 1.0,
            pitch_scale: 1.0,
            carry: 0.0,
            input_scratch: vec![0.0; PROCESS_CHUNK_FRAMES * channels],
            output_scratch: vec![0.0; chunk_output.max(tail_frames) * channels],
            fifo: VecDeque::with_capacity((FIFO_FRAMES + tail_frames) * channels),
            finished: false,
        }
    }

    fn set_time_ratio(&mut self, ratio: f64) {
        if ratio.is_finite() {
            self.time_ratio = ratio.clamp(MIN_TIME_RATIO, MAX_TIME_RATIO);
        }
    }

    fn set_pitch_scale(&mut self, scale: f64) {
        self.pitch_scale = scale;
        self.stretcher
            .set_transpose_factor_semitones(pitch_scale_to_semitones(scale) as f32, None);
    }

    fn reset(&mut self) {
        self.stretcher.reset();
        self.fifo.clear();
        self.carry = 0.0;
        self.finished = false;
        self.time_ratio = 1.0;
        self.set_pitch_scale(1.0);
    }

    fn latency(&self) -> usize {
        self.stretcher.input_latency() + self.stretcher.output_latency()
    }

    fn queued_frames(&self) -> usize {
        self.fifo.len() / self.channels
    }

    /// Stretch `frames` frames from the planar `input` into the FIFO
    ///
    /// Returns false, consuming nothing, when the output would overflow the
    /// FIFO.
    ///
    /// # Safety
    /// `input` must hold `channels` pointers, each valid for `frames` reads.
    unsafe fn process(&mut self, input: *const *const f32, frames: usize, is_final: bool) -> bool {
        let channels = self.channels;
        let flush = is_final && !self.finished;

        let projected = (frames as f64 * self.time_ratio + self.carry).floor() as usize
            + if flush { self.stretcher.output_latency() } else { 0 };
        if self.fifo.len() + projected * channels > self.fifo.capacity() {
            return false;
        }

        if frames > 0 {
            let pointers = std::slice::from_raw_parts(input, channels);
            let mut offset = 0;
            while offset < frames {
                let chunk = (frames - offset).min(PROCESS_CHUNK_FRAMES);
                let exact = chunk as f64 * self.time_ratio + self.carry;
                let out_frames = exact.floor() as usize;
                self.carry = exact - out_frames as f64;

                for (ch, ptr) in pointers.iter().enumerate() {
                    let samples = std::slice::from_raw_parts(ptr.add(offset), chunk);
                    for (i, sample) in samples.iter().enumerate() {
                        self.input_scratch[i * channels + ch] = *sample;
                    }
                }

                let output = &mut self.output_scratch[..out_frames * channels];
                output.fill(0.0);
                self.stretcher
                    .process(&self.input_scratch[..chunk * channels], &mut *output);
                self.fifo.extend(output.iter().copied());
                offset += chunk;
            }
        }

        if flush {
            let tail = &mut self.output_scratch[..self.stretcher.output_latency() * channels];
            tail.fill(0.0);
            self.stretcher.flush(&mut *tail);
            self.fifo.extend(tail.iter().copied());
            self.finished = true;
        }
        true
    }

    /// Move up to `frames` frames from the FIFO into the planar `output`
    ///
    /// # Safety
    /// `output` must hold `channels` pointers, each valid for `frames` writes.
    unsafe fn retrieve(&mut self, output: *const *mut f32, frames: usize) -> usize {
        let channels = self.channels;
        let count = frames.min(self.queued_frames());
        let pointers = std::slice::from_raw_parts(output, channels);

        let mut drained = self.fifo.drain(..count * channels);
        for i in 0..count {
            for ptr in pointers {
                *ptr.add(i) = drained.next().unwrap_or(0.0);
            }
        }
        count
    }
}

/// Resolve a raw handle to its instance
///
/// # Safety
/// `handle` must be null or a live pointer returned by [`SignalsmithLibrary::create`].
unsafe fn instance<'a>(handle: *mut RawStretcher) -> Option<&'a mut StretchInstance> {
    (handle as *mut StretchInstance).as_mut()
}

/// signalsmith-stretch exposed through the foreign stretch ABI
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalsmithLibrary;

impl SignalsmithLibrary {
    pub fn new() -> Self {
        Self
    }
}

// SAFETY: every call validates the handle against null and only dereferences
// pointers the caller guarantees valid; `malloc`/`free` use the process heap
// with a size header so `free` can rebuild the layout.
unsafe impl StretchLibrary for SignalsmithLibrary {
    fn create(
        &self,
        sample_rate: c_uint,
        channels: c_uint,
        options: StretchOptions,
        initial_time_ratio: f64,
        initial_pitch_scale: f64,
    ) -> *mut RawStretcher {
        if sample_rate == 0 || channels == 0 {
            return std::ptr::null_mut();
        }
        let mut instance = StretchInstance::new(sample_rate, channels as usize, options);
        instance.set_time_ratio(initial_time_ratio);
        instance.set_pitch_scale(initial_pitch_scale);

        Box::into_raw(Box::new(instance)) as *mut RawStretcher
    }

    unsafe fn set_time_ratio(&self, handle: *mut RawStretcher, ratio: f64) {
        if let Some(instance) = instance(handle) {
            instance.set_time_ratio(ratio);
        }
    }

    unsafe fn set_pitch_scale(&self, handle: *mut RawStretcher, scale: f64) {
        if let Some(instance) = instance(handle) {
            instance.set_pitch_scale(scale);
        }
    }

    unsafe fn reset(&self, handle: *mut RawStretcher) {
        if let Some(instance) = instance(handle) {
            instance.reset();
        }
    }

    unsafe fn process(
        &self,
        handle: *mut RawStretcher,
        input: *const *const f32,
        frames: c_uint,
        is_final: c_int,
    ) -> c_int {
        let Some(instance) = instance(handle) else {
            return STATUS_INVALID;
        };
        if input.is_null() && frames > 0 {
            return STATUS_INVALID;
        }
        if instance.process(input, frames as usize, is_final != 0) {
            STATUS_OK
        } else {
            STATUS_OVERFLOW
        }
    }

    unsafe fn available(&self, handle: *mut RawStretcher) -> c_int {
        match instance(handle) {
            Some(instance) if instance.finished && instance.fifo.is_empty() => -1,
            Some(instance) => instance.queued_frames().min(c_int::MAX as usize) as c_int,
            None => STATUS_INVALID,
        }
    }

    unsafe fn retrieve(
        &self,
        handle: *mut RawStretcher,
        output: *const *mut f32,
        frames: c_uint,
    ) -> c_int {
        let Some(instance) = instance(handle) else {
            return STATUS_INVALID;
        };
        if output.is_null() {
            return STATUS_INVALID;
        }
        instance.retrieve(output, frames as usize) as c_int
    }

    unsafe fn get_latency(&self, handle: *mut RawStretcher) -> c_int {
        instance(handle).map_or(0, |i| i.latency() as c_int)
    }

    unsafe fn delete(&self, handle: *mut RawStretcher) {
        if !handle.is_null() {
            drop(Box::from_raw(handle as *mut StretchInstance));
        }
    }

    unsafe fn malloc(&self, bytes: usize) -> *mut c_void {
        let Some(total) = bytes.checked_add(HEAP_HEADER) else {
            return std::ptr::null_mut();
        };
        let Ok(layout) = Layout::from_size_align(total, HEAP_HEADER) else {
            return std::ptr::null_mut();
        };
        let base = alloc_zeroed(layout);
        if base.is_null() {
            return std::ptr::null_mut();
        }
        (base as *mut usize).write(total);
        base.add(HEAP_HEADER) as *mut c_void
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        if ptr.is_null() {
            return;
        }
        let base = (ptr as *mut u8).sub(HEAP_HEADER);
        let total = (base as *const usize).read();
        dealloc(base, Layout::from_size_align_unchecked(total, HEAP_HEADER));
    }
}
