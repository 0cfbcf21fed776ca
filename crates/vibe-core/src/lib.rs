//! Vibe Core - real-time time-stretch playback engine

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod player;
pub mod stretch;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use player::{create_player, PlaybackOrchestrator, PlayerEvent, PlayerState};
pub use types::*;
