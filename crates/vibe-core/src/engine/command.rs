//! Lock-free queues between the control and render contexts
//!
//! Three single-producer single-consumer `rtrb` ring buffers connect the
//! orchestrator with the render loop:
//!
//! ```text
//!  control context                          render context
//!  ───────────────                          ──────────────
//!   EngineCommand  ──── command queue ────►  drained at the top of
//!                                            every callback
//!   EngineEvent    ◄──── event queue  ─────  time updates, end, errors
//!   PlaybackSession ◄─── retire queue ─────  replaced / unloaded sessions
//! ```
//!
//! Nothing on the render side allocates or frees: sessions are built on the
//! control context, moved in boxed, and moved back out to be dropped there.

use crate::error::ProcessingError;

use super::clock::ClockSample;
use super::session::PlaybackSession;

/// Commands sent from the control context to the render loop
///
/// Applied in order at the start of the next callback.
pub enum EngineCommand {
    /// Install a session, retiring the current one
    ///
    /// Boxed so the enum stays pointer-sized in the ring buffer.
    Load(Box<PlaybackSession>),
    /// Retire the current session and render silence
    Unload,
    /// Start consuming source audio (pause→play forces a reset)
    Play,
    /// Stop consuming source audio
    Pause,
    /// Move the read position; forces a reset and re-anchors the clock
    Seek { frame: usize },
    /// Stop rendering the current session after a fatal error
    Halt,
}

impl EngineCommand {
    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Load(_) => "load",
            EngineCommand::Unload => "unload",
            EngineCommand::Play => "play",
            EngineCommand::Pause => "pause",
            EngineCommand::Seek { .. } => "seek",
            EngineCommand::Halt => "halt",
        }
    }

    /// Whether applying this command hands a session back to the control context
    #[inline]
    pub(crate) fn retires_session(&self) -> bool {
        matches!(self, EngineCommand::Load(_) | EngineCommand::Unload)
    }
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::Seek { frame } => write!(f, "Seek {{ frame: {} }}", frame),
            other => f.write_str(other.name()),
        }
    }
}

/// Events sent from the render loop to the control context
///
/// Plain data only, so pushing never allocates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// A loaded session is now owned by the render loop
    SessionInstalled,
    /// Throttled clock update while playing
    ///
    /// `applied` is the number of commands the render loop had applied when
    /// the event was pushed; events older than the last command are stale.
    TimeUpdate { sample: ClockSample, applied: u64 },
    /// The final block was flushed and fully drained
    PlaybackEnded { applied: u64 },
    /// A callback failed; `consecutive` counts failing callbacks in a row
    Error {
        error: ProcessingError,
        consecutive: u32,
    },
}

/// Sessions handed back for dropping on the control context
pub type RetiredSession = Box<PlaybackSession>;

/// Create the command queue
pub fn command_channel(
    capacity: usize,
) -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(capacity.max(1))
}

/// Create the event queue
pub fn event_channel(
    capacity: usize,
) -> (rtrb::Producer<EngineEvent>, rtrb::Consumer<EngineEvent>) {
    rtrb::RingBuffer::new(capacity.max(1))
}

/// Create the retire queue
pub fn retire_channel(
    capacity: usize,
) -> (rtrb::Producer<RetiredSession>, rtrb::Consumer<RetiredSession>) {
    rtrb::RingBuffer::new(capacity.max(1))
}
