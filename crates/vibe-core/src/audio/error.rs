//! Audio output error types

use thiserror::Error;

/// Errors raised while opening or running the output stream
#[derive(Error, Debug)]
pub enum AudioError {
    /// The host reports no output devices
    #[error("No audio output devices found")]
    NoDevices,

    /// The host has no default output device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// No device matches the configured name
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to query or negotiate a device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build the output stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start the output stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
