//! RenderLoop - the per-callback procedure
//!
//! Runs on the audio callback thread. Each call to [`RenderLoop::render`]
//! drains pending commands, then produces exactly one block:
//!
//! 1. No session, halted session or dead handle → silence.
//! 2. Query how much stretched output is ready.
//! 3. Paused and nothing left (or a reset pending) → silence, reset on resume.
//! 4. Apply a pending reset (then reapply ratio and pitch), otherwise push
//!    changed parameters live.
//! 5. While playing and short of one block, feed
//!    `ceil(block / ratio) + latency + padding` source frames; the block that
//!    reaches the end of the source carries the final flag, exactly once.
//! 6. Retrieve until the block is full or the stretcher runs dry, applying
//!    gain, and zero-pad the rest.
//! 7. Final block sent and fully drained → end of stream.
//! 8. Advance the clock and emit a throttled time update.
//!
//! Real-time safety: no allocation, no locks, no logging. Sessions arrive
//! boxed and leave through the retire queue.

use std::sync::Arc;

use crate::error::ProcessingError;
use crate::types::{
    semitones_to_pitch_scale, speed_to_time_ratio, PlanarBuffer, DEFAULT_OUTPUT_BLOCK_SIZE,
    INPUT_PADDING_FRAMES,
};

use super::clock::ClockSample;
use super::command::{EngineCommand, EngineEvent, RetiredSession};
use super::params::{ParameterSnapshot, PlaybackAtomics, StretchParameters};
use super::session::PlaybackSession;

/// What a block produced besides audio
#[derive(Debug, Default)]
struct BlockOutcome {
    time_update: Option<ClockSample>,
    ended: Option<ClockSample>,
}

/// Render side of the player, owned by the audio callback
pub struct RenderLoop {
    commands: rtrb::Consumer<EngineCommand>,
    events: rtrb::Producer<EngineEvent>,
    retire: rtrb::Producer<RetiredSession>,
    params: Arc<StretchParameters>,
    atomics: Arc<PlaybackAtomics>,
    session: Option<RetiredSession>,
    /// Commands applied since creation
    applied: u64,
    block_size: usize,
}

impl RenderLoop {
    pub(crate) fn new(
        commands: rtrb::Consumer<EngineCommand>,
        events: rtrb::Producer<EngineEvent>,
        retire: rtrb::Producer<RetiredSession>,
        params: Arc<StretchParameters>,
        atomics: Arc<PlaybackAtomics>,
    ) -> Self {
        Self {
            commands,
            events,
            retire,
            params,
            atomics,
            session: None,
            applied: 0,
            block_size: DEFAULT_OUTPUT_BLOCK_SIZE,
        }
    }

    pub(crate) fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Frames per rendered block, as configured
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The installed session, if any
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_deref()
    }

    #[inline]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Render one block into `output`
    ///
    /// `output.len()` is the block size; output channel `c` carries session
    /// channel `c % channel_count`.
    pub fn render(&mut self, output: &mut PlanarBuffer) {
        self.process_commands();

        let Some(session) = self.session.as_deref_mut() else {
            output.fill_silence();
            self.atomics.publish(0, false, false, 0.0);
            self.atomics.acknowledge_commands(self.applied);
            return;
        };

        if session.halted || !session.engine.is_ready() {
            output.fill_silence();
        } else {
            let params = self.params.snapshot();
            let applied = self.applied;
            let mut written = 0;
            match render_block(session, output, &params, &mut written) {
                Ok(outcome) => {
                    session.consecutive_errors = 0;
                    if let Some(sample) = outcome.time_update {
                        let event = EngineEvent::TimeUpdate { sample, applied };
                        push_event(&mut self.events, event);
                    }
                    if let Some(sample) = outcome.ended {
                        let event = EngineEvent::TimeUpdate { sample, applied };
                        push_event(&mut self.events, event);
                        push_event(&mut self.events, EngineEvent::PlaybackEnded { applied });
                    }
                }
                Err(error) => {
                    output.fill_silence_from(written);
                    session
                        .clock
                        .advance(output.len(), session.engine.ratio(), false);
                    session.consecutive_errors = session.consecutive_errors.saturating_add(1);
                    push_event(
                        &mut self.events,
                        EngineEvent::Error {
                            error,
                            consecutive: session.consecutive_errors,
                        },
                    );
                }
            }
        }

        self.atomics.publish(
            session.current_read_frame,
            session.is_playing,
            session.stream_ended,
            session.clock.source_time(),
        );
        self.atomics.acknowledge_commands(self.applied);
    }

    /// Apply every queued command
    ///
    /// Load and Unload stay queued while the retire queue has no free slot,
    /// so a replaced session is never dropped here.
    fn process_commands(&mut self) {
        loop {
            match self.commands.peek() {
                Ok(cmd) if cmd.retires_session() && self.retire.slots() == 0 => break,
                Ok(_) => {}
                Err(_) => break,
            }
            let Ok(cmd) = self.commands.pop() else {
                break;
            };
            self.apply(cmd);
        }
    }

    fn apply(&mut self, cmd: EngineCommand) {
        self.applied += 1;
        match cmd {
            EngineCommand::Load(session) => {
                self.retire_current();
                self.atomics
                    .publish_session(session.total_frames, session.sample_rate());
                self.session = Some(session);
                push_event(&mut self.events, EngineEvent::SessionInstalled);
            }
            EngineCommand::Unload => {
                self.retire_current();
                self.atomics.publish_session(0, 0);
            }
            EngineCommand::Play => {
                if let Some(session) = self.session.as_deref_mut() {
                    session.play();
                }
            }
            EngineCommand::Pause => {
                if let Some(session) = self.session.as_deref_mut() {
                    session.pause();
                }
            }
            EngineCommand::Seek { frame } => {
                if let Some(session) = self.session.as_deref_mut() {
                    session.seek(frame);
                }
            }
            EngineCommand::Halt => {
                if let Some(session) = self.session.as_deref_mut() {
                    session.halt();
                }
            }
        }
    }

    fn retire_current(&mut self) {
        if let Some(session) = self.session.take() {
            // A slot was checked before the command was popped
            let _ = self.retire.push(session);
        }
    }
}

#[inline]
fn push_event(events: &mut rtrb::Producer<EngineEvent>, event: EngineEvent) {
    // A full queue drops the event; the control context catches up on state
    // through the atomics.
    let _ = events.push(event);
}

/// Produce one block from a live session
///
/// `written` tracks the frames already in `output` so the caller can silence
/// the rest when an error aborts the block.
fn render_block(
    session: &mut PlaybackSession,
    output: &mut PlanarBuffer,
    params: &ParameterSnapshot,
    written: &mut usize,
) -> Result<BlockOutcome, ProcessingError> {
    let frames = output.len();
    let time_ratio = speed_to_time_ratio(params.speed);
    let pitch_scale = semitones_to_pitch_scale(params.pitch_semitones);

    let mut available = session.engine.query_available();

    if !session.is_playing && (available <= 0 || session.reset_needed) {
        output.fill_silence();
        session.reset_needed = true;
        session.clock.advance(frames, session.engine.ratio(), false);
        return Ok(BlockOutcome::default());
    }

    if session.reset_needed {
        session.engine.reset();
        session.engine.set_ratio(time_ratio);
        session.engine.set_pitch_scale(pitch_scale);
        session.applied_version = Some(params.version);
        session.reset_needed = false;
        available = session.engine.query_available();
    } else if session.applied_version != Some(params.version) {
        if session.engine.ratio() != time_ratio {
            session.engine.set_ratio(time_ratio);
        }
        if session.engine.pitch_scale() != pitch_scale {
            session.engine.set_pitch_scale(pitch_scale);
        }
        session.applied_version = Some(params.version);
    }

    if session.is_playing
        && !session.stream_ended
        && !session.final_block_sent
        && available < frames as i32
    {
        let needed = ((frames as f64 / session.engine.ratio()).ceil() as usize
            + session.engine.latency()
            + INPUT_PADDING_FRAMES)
            .clamp(1, session.engine.block_capacity().max(1));
        let start = session.current_read_frame.min(session.total_frames);
        let actual = needed.min(session.total_frames - start);
        let send_final = start + actual >= session.total_frames;

        // With nothing left this is the explicit zero-frame flush
        session
            .engine
            .process(&session.source.channels, start, actual, send_final)?;

        session.current_read_frame = start + actual;
        if send_final {
            session.final_block_sent = true;
        }
    }

    let gain = params.gain as f32;
    let source_channels = session.engine.channel_count();
    while *written < frames {
        let got = session.engine.retrieve(frames - *written)?;
        if got == 0 {
            break;
        }
        let range = *written..*written + got;
        for oc in 0..output.channel_count() {
            let src = session.engine.retrieved_channel(oc % source_channels);
            let dst = &mut output.channel_mut(oc)[range.clone()];
            if gain == 1.0 {
                dst.copy_from_slice(&src[..got]);
            } else {
                for (d, s) in dst.iter_mut().zip(src) {
                    *d = s * gain;
                }
            }
        }
        *written += got;
    }
    output.fill_silence_from(*written);

    let mut outcome = BlockOutcome::default();
    if session.final_block_sent
        && !session.stream_ended
        && session.engine.query_available() <= 0
    {
        session.clock.advance(frames, session.engine.ratio(), false);
        session.finish();
        outcome.ended = Some(session.clock.finish());
        return Ok(outcome);
    }

    session
        .clock
        .advance(frames, session.engine.ratio(), session.is_playing);
    if session.is_playing {
        outcome.time_update = session.clock.poll_update();
    }
    Ok(outcome)
}
