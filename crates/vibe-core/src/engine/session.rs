//! PlaybackSession - everything the render loop needs for one loaded source
//!
//! Built on the control context (stretcher creation and buffer allocation
//! happen there), then moved into the render loop through the command queue
//! and handed back through the retire queue when replaced or unloaded.

use crate::types::SourceAudio;

use super::clock::ClockSync;
use super::stretch_engine::StretchEngine;

/// One loaded source plus its stretcher and transport flags
pub struct PlaybackSession {
    pub(crate) source: SourceAudio,
    pub(crate) total_frames: usize,
    pub(crate) current_read_frame: usize,
    pub(crate) is_playing: bool,
    pub(crate) stream_ended: bool,
    pub(crate) final_block_sent: bool,
    pub(crate) reset_needed: bool,
    /// Set after a fatal error; the session renders silence until replaced
    pub(crate) halted: bool,
    pub(crate) engine: StretchEngine,
    pub(crate) clock: ClockSync,
    /// Parameter snapshot version last pushed into the stretcher
    pub(crate) applied_version: Option<u32>,
    pub(crate) consecutive_errors: u32,
}

impl PlaybackSession {
    pub fn new(source: SourceAudio, engine: StretchEngine, time_update_hz: f64) -> Self {
        let total_frames = source.total_frames();
        let clock = ClockSync::new(source.sample_rate, source.duration_seconds(), time_update_hz);
        Self {
            source,
            total_frames,
            current_read_frame: 0,
            is_playing: false,
            stream_ended: false,
            final_block_sent: false,
            reset_needed: true,
            halted: false,
            engine,
            clock,
            applied_version: None,
            consecutive_errors: 0,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.source.channel_count()
    }

    #[inline]
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    #[inline]
    pub fn current_read_frame(&self) -> usize {
        self.current_read_frame
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    #[inline]
    pub fn stream_ended(&self) -> bool {
        self.stream_ended
    }

    #[inline]
    pub fn final_block_sent(&self) -> bool {
        self.final_block_sent
    }

    #[inline]
    pub fn engine(&self) -> &StretchEngine {
        &self.engine
    }

    #[inline]
    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    /// Start a play cycle; the stretcher is reset before the next output
    pub(crate) fn play(&mut self) {
        if self.is_playing || self.halted {
            return;
        }
        self.is_playing = true;
        self.stream_ended = false;
        self.final_block_sent = false;
        self.reset_needed = true;
    }

    pub(crate) fn pause(&mut self) {
        self.is_playing = false;
    }

    /// Move the read position and re-anchor the clock
    pub(crate) fn seek(&mut self, frame: usize) {
        self.current_read_frame = frame.min(self.total_frames);
        self.stream_ended = false;
        self.final_block_sent = false;
        self.reset_needed = true;
        let seconds = self.current_read_frame as f64 / self.sample_rate().max(1) as f64;
        self.clock.resync(seconds);
    }

    pub(crate) fn halt(&mut self) {
        self.halted = true;
        self.is_playing = false;
    }

    /// Mark the end of the source as reached
    pub(crate) fn finish(&mut self) {
        self.stream_ended = true;
        self.is_playing = false;
        self.current_read_frame = self.total_frames;
        self.reset_needed = true;
    }
}
