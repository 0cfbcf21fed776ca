//! Player - the command-facing side of the engine
//!
//! [`create_player`] wires the lock-free queues and shared state, returning
//! the [`PlaybackOrchestrator`] for the control context and the
//! [`RenderLoop`](crate::engine::RenderLoop) for the audio callback.

mod orchestrator;
mod state;

pub use orchestrator::{create_player, PlaybackOrchestrator};
pub use state::{PlayerEvent, PlayerState};
