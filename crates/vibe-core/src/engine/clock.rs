//! ClockSync - source-time clock for the UI
//!
//! The stretcher favours audio quality over exact output frame counts, so
//! its read position drifts from what the listener has heard. The clock
//! instead integrates delivered output frames scaled by the current speed,
//! and is re-anchored whenever the orchestrator seeks (pause, seek, load all
//! end in a seek to the last authoritative time).
//!
//! Updates are throttled on device time (frames rendered), not wall time, so
//! the render path never reads a system clock.

use crate::types::DEFAULT_TIME_UPDATE_HZ;

/// A device-time / source-time pair reported to the control context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    /// Seconds of audio rendered by the device since the session was installed
    pub device_time_seconds: f64,
    /// Position in the source the listener is hearing, in seconds
    pub source_time_seconds: f64,
}

/// Throttled, monotonic source clock for one session
#[derive(Debug, Clone)]
pub struct ClockSync {
    sample_rate: f64,
    duration_seconds: f64,
    update_interval: f64,
    source_time: f64,
    device_frames: u64,
    /// Device time of the last emitted update; `None` forces the next one
    last_emit: Option<f64>,
}

impl ClockSync {
    pub fn new(sample_rate: u32, duration_seconds: f64, update_hz: f64) -> Self {
        let update_hz = if update_hz.is_finite() && update_hz > 0.0 {
            update_hz
        } else {
            DEFAULT_TIME_UPDATE_HZ
        };
        Self {
            sample_rate: sample_rate.max(1) as f64,
            duration_seconds: duration_seconds.max(0.0),
            update_interval: 1.0 / update_hz,
            source_time: 0.0,
            device_frames: 0,
            last_emit: None,
        }
    }

    /// Current source time in seconds
    #[inline]
    pub fn source_time(&self) -> f64 {
        self.source_time
    }

    /// Device time in seconds
    #[inline]
    pub fn device_time(&self) -> f64 {
        self.device_frames as f64 / self.sample_rate
    }

    /// Minimum device time between two updates
    #[inline]
    pub fn update_interval(&self) -> f64 {
        self.update_interval
    }

    /// Re-anchor on an authoritative source time and reset the throttle
    pub fn resync(&mut self, source_seconds: f64) {
        self.source_time = source_seconds.clamp(0.0, self.duration_seconds);
        self.last_emit = None;
    }

    /// Account for one callback's output
    ///
    /// `output_frames` frames reached the device; while playing they cover
    /// `output_frames / time_ratio` source frames.
    pub fn advance(&mut self, output_frames: usize, time_ratio: f64, playing: bool) {
        self.device_frames += output_frames as u64;
        if playing && time_ratio > 0.0 {
            let consumed = output_frames as f64 / time_ratio / self.sample_rate;
            self.source_time = (self.source_time + consumed).min(self.duration_seconds);
        }
    }

    /// The update due now, if the throttle interval has elapsed
    pub fn poll_update(&mut self) -> Option<ClockSample> {
        let now = self.device_time();
        let due = match self.last_emit {
            None => true,
            Some(last) => now - last >= self.update_interval,
        };
        if !due {
            return None;
        }
        self.last_emit = Some(now);
        Some(self.sample())
    }

    /// Jump to the end of the source and produce the final update
    ///
    /// The throttle is reset so the next play run reports immediately.
    pub fn finish(&mut self) -> ClockSample {
        self.source_time = self.duration_seconds;
        self.last_emit = None;
        self.sample()
    }

    /// Current pair without touching the throttle
    pub fn sample(&self) -> ClockSample {
        ClockSample {
            device_time_seconds: self.device_time(),
            source_time_seconds: self.source_time,
        }
    }
}
