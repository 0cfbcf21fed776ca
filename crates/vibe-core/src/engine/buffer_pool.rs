//! Foreign-memory channel buffers shared with the stretch library
//!
//! The stretcher reads input and writes output through arrays of per-channel
//! pointers that live in its own heap. A [`ChannelBufferSet`] owns one input
//! and one output buffer per channel plus the two pointer arrays; all of it
//! is allocated up front so the render path never touches the allocator.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::AllocationError;
use crate::stretch::StretchLibrary;

/// Allocates and frees channel buffers in the stretch library's heap
///
/// Cheap to clone; all clones share the live-buffer counter.
#[derive(Clone)]
pub struct NativeBufferPool {
    library: Arc<dyn StretchLibrary>,
    live_buffers: Arc<AtomicUsize>,
}

impl NativeBufferPool {
    pub fn new(library: Arc<dyn StretchLibrary>) -> Self {
        Self {
            library,
            live_buffers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The library whose heap backs this pool
    pub fn library(&self) -> &Arc<dyn StretchLibrary> {
        &self.library
    }

    /// Number of per-channel buffers currently allocated through this pool
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Acquire)
    }

    /// Allocate `channel_count` input and output buffers of `block_capacity` frames
    ///
    /// All-or-nothing: on any failure every buffer allocated by this call is
    /// freed before the error is returned.
    pub fn allocate_channel_buffers(
        &self,
        channel_count: usize,
        block_capacity: usize,
    ) -> Result<ChannelBufferSet, AllocationError> {
        if channel_count == 0 || block_capacity == 0 {
            return Err(AllocationError::InvalidRequest {
                channels: channel_count,
                capacity: block_capacity,
            });
        }

        let bytes = block_capacity * std::mem::size_of::<f32>();
        let pointer_bytes = channel_count * std::mem::size_of::<*mut f32>();

        let mut set = ChannelBufferSet::empty(self.clone());
        set.block_capacity = block_capacity;
        set.inputs.reserve_exact(channel_count);
        set.outputs.reserve_exact(channel_count);

        for channel in 0..channel_count {
            match self.allocate_samples(bytes) {
                Some(ptr) => set.inputs.push(ptr),
                None => {
                    self.free(&mut set);
                    return Err(AllocationError::ChannelBuffer { channel, bytes });
                }
            }
        }
        for channel in 0..channel_count {
            match self.allocate_samples(bytes) {
                Some(ptr) => set.outputs.push(ptr),
                None => {
                    self.free(&mut set);
                    return Err(AllocationError::ChannelBuffer { channel, bytes });
                }
            }
        }

        // SAFETY: malloc either fails (null) or returns `pointer_bytes` writable bytes
        // aligned for pointer storage; we write exactly `channel_count` pointers.
        unsafe {
            set.input_pointers = self.library.malloc(pointer_bytes) as *mut *mut f32;
            if set.input_pointers.is_null() {
                self.free(&mut set);
                return Err(AllocationError::PointerArray { bytes: pointer_bytes });
            }
            set.output_pointers = self.library.malloc(pointer_bytes) as *mut *mut f32;
            if set.output_pointers.is_null() {
                self.free(&mut set);
                return Err(AllocationError::PointerArray { bytes: pointer_bytes });
            }
            for (i, ptr) in set.inputs.iter().enumerate() {
                set.input_pointers.add(i).write(*ptr);
            }
            for (i, ptr) in set.outputs.iter().enumerate() {
                set.output_pointers.add(i).write(*ptr);
            }
        }

        Ok(set)
    }

    /// Free every buffer in `set`; safe to call on an empty or already-freed set
    pub fn free(&self, set: &mut ChannelBufferSet) {
        // SAFETY: every pointer in the set came from this library's malloc and is
        // removed from the set before being freed, so nothing is freed twice.
        unsafe {
            for ptr in set.inputs.drain(..).chain(set.outputs.drain(..)) {
                self.library.free(ptr as *mut c_void);
                self.live_buffers.fetch_sub(1, Ordering::AcqRel);
            }
            if !set.input_pointers.is_null() {
                self.library.free(set.input_pointers as *mut c_void);
                set.input_pointers = std::ptr::null_mut();
            }
            if !set.output_pointers.is_null() {
                self.library.free(set.output_pointers as *mut c_void);
                set.output_pointers = std::ptr::null_mut();
            }
        }
        set.block_capacity = 0;
    }

    fn allocate_samples(&self, bytes: usize) -> Option<*mut f32> {
        // SAFETY: a non-null result is a fresh block of `bytes` bytes; zeroing it
        // stays within bounds.
        unsafe {
            let ptr = self.library.malloc(bytes) as *mut f32;
            if ptr.is_null() {
                return None;
            }
            std::ptr::write_bytes(ptr as *mut u8, 0, bytes);
            self.live_buffers.fetch_add(1, Ordering::AcqRel);
            Some(ptr)
        }
    }
}

/// Per-channel input/output buffers in foreign memory
///
/// Buffers are freed when the set is dropped, or earlier via
/// [`NativeBufferPool::free`].
pub struct ChannelBufferSet {
    pool: NativeBufferPool,
    inputs: Vec<*mut f32>,
    outputs: Vec<*mut f32>,
    input_pointers: *mut *mut f32,
    output_pointers: *mut *mut f32,
    block_capacity: usize,
}

// SAFETY: the set exclusively owns its foreign allocations; the library's heap
// is not tied to the allocating thread (StretchLibrary: Send + Sync).
unsafe impl Send for ChannelBufferSet {}

impl ChannelBufferSet {
    fn empty(pool: NativeBufferPool) -> Self {
        Self {
            pool,
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_pointers: std::ptr::null_mut(),
            output_pointers: std::ptr::null_mut(),
            block_capacity: 0,
        }
    }

    /// Number of channels
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.inputs.len()
    }

    /// Frames each buffer can hold
    #[inline]
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Number of per-channel buffers held (input + output)
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer_count() == 0
    }

    /// Foreign array of input channel pointers, as the ABI expects it
    #[inline]
    pub fn input_pointers(&self) -> *const *const f32 {
        self.input_pointers as *const *const f32
    }

    /// Foreign array of output channel pointers, as the ABI expects it
    #[inline]
    pub fn output_pointers(&self) -> *const *mut f32 {
        self.output_pointers as *const *mut f32
    }

    /// Input buffer of one channel
    #[inline]
    pub fn input_mut(&mut self, channel: usize) -> &mut [f32] {
        // SAFETY: each input pointer is valid for `block_capacity` floats while the
        // set is alive, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.inputs[channel], self.block_capacity) }
    }

    /// First `frames` frames of one channel's output buffer
    #[inline]
    pub fn output(&self, channel: usize, frames: usize) -> &[f32] {
        let frames = frames.min(self.block_capacity);
        // SAFETY: each output pointer is valid for `block_capacity` floats while the
        // set is alive; the library only writes into it during `retrieve`, which
        // requires `&mut` access to the owning engine.
        unsafe { std::slice::from_raw_parts(self.outputs[channel], frames) }
    }
}

impl Drop for ChannelBufferSet {
    fn drop(&mut self) {
        if !self.is_empty() || !self.input_pointers.is_null() || !self.output_pointers.is_null() {
            let pool = self.pool.clone();
            pool.free(self);
        }
    }
}
