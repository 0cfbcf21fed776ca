//! Player state machine states and outgoing events

use std::fmt;

/// Orchestrator state
///
/// ```text
/// UNINITIALIZED ─load─► LOADING ─ack─► READY ◄─pause/end── PLAYING
///                          │            │  ▲ ────play─────►  │  ▲
///                          │  begin_seek│  │end_seek         │  │end_seek
///                          │            ▼  │       begin_seek▼  │
///                          │          SEEK_HOLD          SEEK_RESUME
///                          └──────────► ERROR ◄── any state (fatal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Playing,
    /// Seek gesture started from READY
    SeekHold,
    /// Seek gesture started from PLAYING; playback resumes on release
    SeekResume,
    Error,
}

impl PlayerState {
    /// Whether a session is installed and usable
    pub fn is_loaded(self) -> bool {
        matches!(
            self,
            PlayerState::Ready | PlayerState::Playing | PlayerState::SeekHold | PlayerState::SeekResume
        )
    }

    /// Whether the user expects audio to be moving
    pub fn is_playing(self) -> bool {
        matches!(self, PlayerState::Playing)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Uninitialized => "UNINITIALIZED",
            PlayerState::Loading => "LOADING",
            PlayerState::Ready => "READY",
            PlayerState::Playing => "PLAYING",
            PlayerState::SeekHold => "SEEK_HOLD",
            PlayerState::SeekResume => "SEEK_RESUME",
            PlayerState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Events published to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The loaded source is ready to play
    Ready { duration_seconds: f64 },
    /// Playback started or stopped
    PlaybackState { is_playing: bool },
    /// Current source position
    TimeUpdate { seconds: f64 },
    /// Human-readable failure
    Error { message: String },
    /// The source played to its end
    Ended,
}
