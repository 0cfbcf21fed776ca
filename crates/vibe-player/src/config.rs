//! Player configuration
//!
//! Stored as YAML in `~/.config/vibe-player/player.yaml`. Missing fields take
//! their defaults, so a partial file is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vibe_core::audio::AudioConfig;
use vibe_core::config::{default_config_path, EngineConfig};

const CONFIG_FILENAME: &str = "player.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Render engine settings
    pub engine: EngineConfig,
    /// Output device settings
    pub audio: AudioConfig,
}

/// Default location of the player config
pub fn player_config_path() -> PathBuf {
    default_config_path(CONFIG_FILENAME)
}
