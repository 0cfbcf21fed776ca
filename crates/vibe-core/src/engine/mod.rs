//! Playback engine - stretcher, buffers, clock and the render loop
//!
//! - NativeBufferPool: channel buffers in the stretch library's heap
//! - StretchEngine: one native stretcher handle per loaded session
//! - ClockSync: throttled source-time clock for the UI
//! - RenderLoop: the per-callback procedure and its command/event queues

mod buffer_pool;
mod clock;
mod command;
mod params;
mod render;
mod session;
mod stretch_engine;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer_pool::*;
pub use clock::*;
pub use command::*;
pub use params::*;
pub use render::*;
pub use session::*;
pub use stretch_engine::*;
