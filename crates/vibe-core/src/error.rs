//! Error types for the playback engine
//!
//! Every failure path of the engine is an explicit value: initialization and
//! allocation errors gate `LOADING → READY`, processing errors are reported by
//! the render loop as events, and command channel errors come from the
//! lock-free queues between the control and render contexts.

use std::time::Duration;

use thiserror::Error;

use crate::player::PlayerState;

/// Failures while creating a stretcher and its buffers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InitializationError {
    /// Sample rate of zero
    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Channel count of zero
    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(usize),

    /// Source channels have different lengths or no frames
    #[error("Invalid source audio: {0}")]
    InvalidSource(String),

    /// The stretch library returned a null handle
    #[error("Stretcher creation failed: {channels} channels @ {sample_rate}Hz")]
    CreateFailed { sample_rate: u32, channels: usize },

    /// Buffer allocation failed after the handle was created
    #[error("Failed to allocate stretch buffers: {0}")]
    Allocation(#[from] AllocationError),
}

/// Failures while allocating foreign channel buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Zero channels or zero capacity requested
    #[error("Invalid buffer request: {channels} channels x {capacity} frames")]
    InvalidRequest { channels: usize, capacity: usize },

    /// A per-channel sample buffer could not be allocated
    #[error("Failed to allocate {bytes} bytes for channel {channel} buffer")]
    ChannelBuffer { channel: usize, bytes: usize },

    /// A channel pointer array could not be allocated
    #[error("Failed to allocate {bytes} bytes for channel pointer array")]
    PointerArray { bytes: usize },
}

/// Failures signalled by the stretcher during a render callback
///
/// Carries only plain data so it can travel through the event queue without
/// allocating on the render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// The native process call returned a failure code
    #[error("Stretcher process failed with code {0}")]
    ProcessFailed(i32),

    /// The native retrieve call returned a failure code
    #[error("Stretcher retrieve failed with code {0}")]
    RetrieveFailed(i32),

    /// The engine was used before initialize or after teardown
    #[error("Stretcher used without a live handle")]
    NotInitialized,
}

/// Failures delivering messages between the control and render contexts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandChannelError {
    /// The command queue is full
    #[error("Command queue full, dropped {0}")]
    QueueFull(&'static str),

    /// The render context did not hand back the session in time
    #[error("Render context did not release the session within {0:?}")]
    QuiesceTimeout(Duration),
}

/// Umbrella error returned by the control surface
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    CommandChannel(#[from] CommandChannelError),

    /// The command is not accepted in the current player state
    #[error("Command '{command}' rejected in state {state:?}")]
    InvalidState {
        command: &'static str,
        state: PlayerState,
    },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
