//! Deterministic stretch library for engine tests
//!
//! Produces exactly `floor(frames * ratio)` output frames per process call
//! (fraction carried over), optionally preceded by `latency` frames of silence
//! after every reset, and counts every ABI call so tests can assert on resets,
//! final flushes and live foreign allocations.

use std::collections::VecDeque;
use std::ffi::{c_int, c_uint, c_void};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::stretch::{RawStretcher, StretchLibrary, StretchOptions, STATUS_INVALID, STATUS_OK};

/// Call counters shared between a [`MockLibrary`] and the test body
#[derive(Debug, Default)]
pub struct MockStats {
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub resets: AtomicUsize,
    pub process_calls: AtomicUsize,
    pub final_calls: AtomicUsize,
    pub set_ratio_calls: AtomicUsize,
    pub set_pitch_calls: AtomicUsize,
    pub live_allocations: AtomicUsize,
    /// Remaining successful mallocs before failures start; negative = unlimited
    pub malloc_budget: AtomicI64,
    pub fail_create: AtomicBool,
    pub fail_process: AtomicBool,
    pub fail_retrieve: AtomicBool,
}

impl MockStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct MockInstance {
    channels: usize,
    latency: usize,
    time_ratio: f64,
    pitch_scale: f64,
    carry: f64,
    pending_latency: usize,
    fifo: Vec<VecDeque<f32>>,
    finished: bool,
}

impl MockInstance {
    fn reset(&mut self) {
        self.time_ratio = 1.0;
        self.pitch_scale = 1.0;
        self.carry = 0.0;
        self.pending_latency = self.latency;
        self.finished = false;
        for channel in &mut self.fifo {
            channel.clear();
        }
    }

    fn queued(&self) -> usize {
        self.fifo.first().map_or(0, VecDeque::len)
    }
}

/// Snapshot of an instance's internal state, for comparing resets
#[derive(Debug, Clone, PartialEq)]
pub struct MockState {
    pub time_ratio: f64,
    pub pitch_scale: f64,
    pub carry: f64,
    pub queued: usize,
    pub pending_latency: usize,
    pub finished: bool,
}

/// Mock stretch library
pub struct MockLibrary {
    pub stats: Arc<MockStats>,
    latency: usize,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::with_latency(0)
    }

    pub fn with_latency(latency: usize) -> Self {
        let stats = MockStats::default();
        stats.malloc_budget.store(-1, Ordering::SeqCst);
        Self {
            stats: Arc::new(stats),
            latency,
        }
    }

    /// Allow `count` more successful mallocs, then fail every call
    pub fn fail_mallocs_after(&self, count: i64) {
        self.stats.malloc_budget.store(count, Ordering::SeqCst);
    }

    /// Inspect an instance's state
    ///
    /// # Safety
    /// `handle` must be a live handle created by this library.
    pub unsafe fn state(&self, handle: *mut RawStretcher) -> MockState {
        let instance = &*(handle as *const MockInstance);
        MockState {
            time_ratio: instance.time_ratio,
            pitch_scale: instance.pitch_scale,
            carry: instance.carry,
            queued: instance.queued(),
            pending_latency: instance.pending_latency,
            finished: instance.finished,
        }
    }
}

unsafe fn instance<'a>(handle: *mut RawStretcher) -> Option<&'a mut MockInstance> {
    (handle as *mut MockInstance).as_mut()
}

unsafe impl StretchLibrary for MockLibrary {
    fn create(
        &self,
        sample_rate: c_uint,
        channels: c_uint,
        _options: StretchOptions,
        initial_time_ratio: f64,
        initial_pitch_scale: f64,
    ) -> *mut RawStretcher {
        if self.stats.fail_create.load(Ordering::SeqCst) || sample_rate == 0 || channels == 0 {
            return std::ptr::null_mut();
        }
        self.stats.creates.fetch_add(1, Ordering::SeqCst);
        let instance = MockInstance {
            channels: channels as usize,
            latency: self.latency,
            time_ratio: initial_time_ratio,
            pitch_scale: initial_pitch_scale,
            carry: 0.0,
            pending_latency: self.latency,
            fifo: vec![VecDeque::new(); channels as usize],
            finished: false,
        };
        Box::into_raw(Box::new(instance)) as *mut RawStretcher
    }

    unsafe fn set_time_ratio(&self, handle: *mut RawStretcher, ratio: f64) {
        self.stats.set_ratio_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(instance) = instance(handle) {
            instance.time_ratio = ratio;
        }
    }

    unsafe fn set_pitch_scale(&self, handle: *mut RawStretcher, scale: f64) {
        self.stats.set_pitch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(instance) = instance(handle) {
            instance.pitch_scale = scale;
        }
    }

    unsafe fn reset(&self, handle: *mut RawStretcher) {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
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
        self.stats.process_calls.fetch_add(1, Ordering::SeqCst);
        if is_final != 0 {
            self.stats.final_calls.fetch_add(1, Ordering::SeqCst);
        }
        if self.stats.fail_process.load(Ordering::SeqCst) {
            return -7;
        }

        let frames = frames as usize;
        if frames > 0 {
            if instance.pending_latency > 0 {
                for channel in &mut instance.fifo {
                    channel.extend(std::iter::repeat(0.0).take(instance.pending_latency));
                }
                instance.pending_latency = 0;
            }
            let exact = frames as f64 * instance.time_ratio + instance.carry;
            let out_frames = exact.floor() as usize;
            instance.carry = exact - out_frames as f64;

            let pointers = std::slice::from_raw_parts(input, instance.channels);
            for (ch, ptr) in pointers.iter().enumerate() {
                let samples = std::slice::from_raw_parts(*ptr, frames);
                for j in 0..out_frames {
                    let src = ((j as f64 / instance.time_ratio) as usize).min(frames - 1);
                    instance.fifo[ch].push_back(samples[src]);
                }
            }
        }
        if is_final != 0 {
            instance.finished = true;
        }
        STATUS_OK
    }

    unsafe fn available(&self, handle: *mut RawStretcher) -> c_int {
        match instance(handle) {
            Some(instance) if instance.finished && instance.queued() == 0 => -1,
            Some(instance) => instance.queued() as c_int,
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
        if self.stats.fail_retrieve.load(Ordering::SeqCst) {
            return -9;
        }
        let count = (frames as usize).min(instance.queued());
        let pointers = std::slice::from_raw_parts(output, instance.channels);
        for (ch, ptr) in pointers.iter().enumerate() {
            for i in 0..count {
                *ptr.add(i) = instance.fifo[ch].pop_front().unwrap_or(0.0);
            }
        }
        count as c_int
    }

    unsafe fn get_latency(&self, handle: *mut RawStretcher) -> c_int {
        instance(handle).map_or(0, |i| i.latency as c_int)
    }

    unsafe fn delete(&self, handle: *mut RawStretcher) {
        if !handle.is_null() {
            self.stats.deletes.fetch_add(1, Ordering::SeqCst);
            drop(Box::from_raw(handle as *mut MockInstance));
        }
    }

    unsafe fn malloc(&self, bytes: usize) -> *mut c_void {
        let budget = self.stats.malloc_budget.load(Ordering::SeqCst);
        if budget == 0 {
            return std::ptr::null_mut();
        }
        if budget > 0 {
            self.stats.malloc_budget.fetch_sub(1, Ordering::SeqCst);
        }
        // Word-sized slots keep the block aligned for both f32 and pointers
        let words = bytes.div_ceil(std::mem::size_of::<u64>()) + 1;
        let mut block = vec![0u64; words].into_boxed_slice();
        block[0] = words as u64;
        let base = Box::into_raw(block) as *mut u64;
        self.stats.live_allocations.fetch_add(1, Ordering::SeqCst);
        base.add(1) as *mut c_void
    }

    unsafe fn free(&self, ptr: *mut c_void) {
        if ptr.is_null() {
            return;
        }
        let base = (ptr as *mut u64).sub(1);
        let words = *base as usize;
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(base, words)));
        self.stats.live_allocations.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A source of `seconds` seconds of a constant non-zero signal
pub fn constant_source(
    sample_rate: u32,
    channels: usize,
    seconds: f64,
) -> crate::types::SourceAudio {
    let frames = (sample_rate as f64 * seconds).round() as usize;
    crate::types::SourceAudio::new(sample_rate, vec![vec![0.25; frames]; channels])
}
