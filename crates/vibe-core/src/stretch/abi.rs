//! Raw ABI of the foreign time-stretch library
//!
//! The engine talks to the stretcher only through this surface. Handles and
//! channel pointer arrays are raw foreign pointers; the channel pointer arrays
//! hold one pointer per channel, each pointing at contiguous samples for that
//! channel, and are themselves allocated from the library's heap.

use std::ffi::{c_int, c_uint, c_void};

/// Opaque stretcher instance owned by the foreign library
#[repr(C)]
#[derive(Debug)]
pub struct RawStretcher {
    _private: [u8; 0],
}

/// Option bit set passed to `create`
pub type StretchOptions = c_int;

/// Real-time processing mode (the only mode the engine uses)
pub const OPTION_PROCESS_REALTIME: StretchOptions = 0x0000_0001;

/// Trade some quality for a cheaper engine
pub const OPTION_ENGINE_CHEAPER: StretchOptions = 0x0000_0100;

/// Status returned by `process` on success
pub const STATUS_OK: c_int = 0;

/// Generic failure status for a call made with an invalid handle or arguments
pub const STATUS_INVALID: c_int = -1;

/// `process` refused input whose output would not fit the pending output
pub const STATUS_OVERFLOW: c_int = -2;

/// The foreign stretch library
///
/// Mirrors the library's exported C functions one-to-one, plus the heap the
/// library's buffers live in.
///
/// # Safety
///
/// Implementors must uphold the C contract of each call:
/// - `create` returns null on failure, never a dangling pointer.
/// - Every other call tolerates `handle == null` (returning an error code or
///   doing nothing) and otherwise only reads/writes `frames` samples through
///   each of the `channels` pointers in the arrays passed to it.
/// - `malloc` returns null on failure and memory aligned for `f32` and
///   pointer storage; `free` accepts any pointer returned by `malloc`, and null.
///
/// Callers must only pass handles obtained from `create` on the same library
/// (and not yet deleted), and pointer arrays with one valid entry per channel.
pub unsafe trait StretchLibrary: Send + Sync {
    /// Create a stretcher; returns null on failure
    fn create(
        &self,
        sample_rate: c_uint,
        channels: c_uint,
        options: StretchOptions,
        initial_time_ratio: f64,
        initial_pitch_scale: f64,
    ) -> *mut RawStretcher;

    /// Change the time ratio (output duration / input duration) without a reset
    unsafe fn set_time_ratio(&self, handle: *mut RawStretcher, ratio: f64);

    /// Change the pitch scale (frequency multiplier) without a reset
    unsafe fn set_pitch_scale(&self, handle: *mut RawStretcher, scale: f64);

    /// Clear internal DSP state; ratio and pitch return to their defaults
    unsafe fn reset(&self, handle: *mut RawStretcher);

    /// Feed `frames` frames from `input` (one pointer per channel)
    ///
    /// Returns [`STATUS_OK`] or a negative failure code.
    unsafe fn process(
        &self,
        handle: *mut RawStretcher,
        input: *const *const f32,
        frames: c_uint,
        is_final: c_int,
    ) -> c_int;

    /// Frames ready for retrieval; -1 once the final block has been drained
    unsafe fn available(&self, handle: *mut RawStretcher) -> c_int;

    /// Copy up to `frames` frames into `output`; returns frames copied or a negative code
    unsafe fn retrieve(
        &self,
        handle: *mut RawStretcher,
        output: *const *mut f32,
        frames: c_uint,
    ) -> c_int;

    /// Start delay of the stretcher in frames
    unsafe fn get_latency(&self, handle: *mut RawStretcher) -> c_int;

    /// Destroy a stretcher; null is a no-op
    unsafe fn delete(&self, handle: *mut RawStretcher);

    /// Allocate `bytes` bytes of library memory; null on failure
    unsafe fn malloc(&self, bytes: usize) -> *mut c_void;

    /// Release memory returned by `malloc`; null is a no-op
    unsafe fn free(&self, ptr: *mut c_void);
}
