//! Engine configuration
//!
//! Sizes of the render block, the foreign exchange buffers and the queues,
//! the clock cadence, error tolerance and the initial stretch parameters.

use serde::{Deserialize, Serialize};

use crate::stretch::{StretchOptions, OPTION_ENGINE_CHEAPER, OPTION_PROCESS_REALTIME};
use crate::types::{
    DEFAULT_BLOCK_CAPACITY, DEFAULT_OUTPUT_BLOCK_SIZE, DEFAULT_TIME_UPDATE_HZ,
    INPUT_PADDING_FRAMES, MIN_TIME_RATIO,
};

/// Quality/CPU trade-off of the stretcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StretchProfile {
    /// Full quality
    #[default]
    Default,
    /// Lower CPU use, slightly lower quality
    Cheaper,
}

impl StretchProfile {
    /// Option bits passed to `create`
    pub fn options(self) -> StretchOptions {
        match self {
            StretchProfile::Default => OPTION_PROCESS_REALTIME,
            StretchProfile::Cheaper => OPTION_PROCESS_REALTIME | OPTION_ENGINE_CHEAPER,
        }
    }
}

/// Playback engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames rendered per block
    /// Default: 128
    pub output_block_size: usize,
    /// Per-channel frames of each foreign buffer
    /// Must cover one block at the slowest ratio plus stretcher latency.
    /// Default: 16384
    pub block_capacity: usize,
    /// Slots in the control → render command queue
    pub command_queue_capacity: usize,
    /// Slots in the render → control event queue
    pub event_queue_capacity: usize,
    /// Time updates per second of device time
    /// Default: 15.0
    pub time_update_hz: f64,
    /// Failing callbacks in a row before the player enters ERROR
    pub max_consecutive_errors: u32,
    /// How long teardown waits for the render loop to release the session
    pub quiesce_timeout_ms: u64,
    /// Stretcher quality profile
    pub stretch_profile: StretchProfile,
    /// Speed applied on startup (1.0 = normal)
    pub initial_speed: f64,
    /// Pitch shift applied on startup, in semitones
    pub initial_pitch_semitones: f64,
    /// Linear gain applied on startup
    pub initial_gain: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_block_size: DEFAULT_OUTPUT_BLOCK_SIZE,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            command_queue_capacity: 64,
            event_queue_capacity: 256,
            time_update_hz: DEFAULT_TIME_UPDATE_HZ,
            max_consecutive_errors: 8,
            quiesce_timeout_ms: 500,
            stretch_profile: StretchProfile::Default,
            initial_speed: 1.0,
            initial_pitch_semitones: 0.0,
            initial_gain: 1.0,
        }
    }
}

impl EngineConfig {
    /// Smallest buffer capacity that holds one block's input at the slowest ratio
    pub fn min_block_capacity(&self) -> usize {
        (self.output_block_size as f64 / MIN_TIME_RATIO).ceil() as usize + INPUT_PADDING_FRAMES
    }

    /// A copy with out-of-range values replaced (logged)
    pub fn validated(&self) -> Self {
        let mut config = self.clone();
        let defaults = Self::default();

        if config.output_block_size == 0 {
            log::warn!("EngineConfig: output_block_size 0, using {}", defaults.output_block_size);
            config.output_block_size = defaults.output_block_size;
        }
        let min_capacity = config.min_block_capacity();
        if config.block_capacity < min_capacity {
            log::warn!(
                "EngineConfig: block_capacity {} below {}, raising",
                config.block_capacity,
                min_capacity
            );
            config.block_capacity = min_capacity;
        }
        if config.command_queue_capacity == 0 {
            config.command_queue_capacity = defaults.command_queue_capacity;
        }
        if config.event_queue_capacity == 0 {
            config.event_queue_capacity = defaults.event_queue_capacity;
        }
        if !(config.time_update_hz.is_finite() && config.time_update_hz > 0.0) {
            log::warn!(
                "EngineConfig: invalid time_update_hz {}, using {}",
                config.time_update_hz,
                defaults.time_update_hz
            );
            config.time_update_hz = defaults.time_update_hz;
        }
        if config.max_consecutive_errors == 0 {
            config.max_consecutive_errors = 1;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity_covers_slowest_ratio() {
        let config = EngineConfig::default();
        assert!(config.block_capacity >= config.min_block_capacity());
        assert_eq!(config.validated(), config);
    }

    #[test]
    fn test_validated_repairs_bad_values() {
        let config = EngineConfig {
            output_block_size: 0,
            block_capacity: 10,
            time_update_hz: f64::NAN,
            max_consecutive_errors: 0,
            ..EngineConfig::default()
        }
        .validated();
        assert_eq!(config.output_block_size, DEFAULT_OUTPUT_BLOCK_SIZE);
        assert_eq!(config.block_capacity, config.min_block_capacity());
        assert_eq!(config.time_update_hz, DEFAULT_TIME_UPDATE_HZ);
        assert_eq!(config.max_consecutive_errors, 1);
    }

    #[test]
    fn test_profile_options() {
        assert_eq!(StretchProfile::Default.options() & OPTION_ENGINE_CHEAPER, 0);
        assert_ne!(StretchProfile::Cheaper.options() & OPTION_ENGINE_CHEAPER, 0);
    }

    #[test]
    fn test_profile_yaml_names() {
        let yaml = serde_yaml::to_string(&StretchProfile::Cheaper).unwrap();
        assert_eq!(yaml.trim(), "cheaper");
    }
}
