//! Lock-free state shared between the control and render contexts
//!
//! - [`StretchParameters`]: speed, pitch and gain written by the control
//!   context, read once per callback by the render loop.
//! - [`PlaybackAtomics`]: position and transport state written by the render
//!   loop, read by the control context without touching the engine.
//!
//! All cross-thread values are plain atomics; no lock is taken on either side.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::types::{MAX_TIME_RATIO, MIN_TIME_RATIO};

/// Slowest accepted playback speed
pub const MIN_SPEED: f64 = 1.0 / MAX_TIME_RATIO;

/// Fastest accepted playback speed
pub const MAX_SPEED: f64 = 1.0 / MIN_TIME_RATIO;

/// Read attempts before the reader settles for the latest values
const SNAPSHOT_RETRIES: usize = 64;

/// A consistent view of the stretch parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub speed: f64,
    pub pitch_semitones: f64,
    pub gain: f64,
    /// Incremented on every write; equal versions mean equal values
    pub version: u32,
}

/// Single-writer/single-reader parameter snapshot
///
/// Guarded by a sequence counter: the writer makes it odd while storing and
/// even when done, the reader retries while the counter is odd or moved.
#[derive(Debug)]
pub struct StretchParameters {
    sequence: AtomicU32,
    speed: AtomicU64,
    pitch_semitones: AtomicU64,
    gain: AtomicU64,
}

impl StretchParameters {
    pub fn new(speed: f64, pitch_semitones: f64, gain: f64) -> Self {
        let params = Self {
            sequence: AtomicU32::new(0),
            speed: AtomicU64::new(1f64.to_bits()),
            pitch_semitones: AtomicU64::new(0f64.to_bits()),
            gain: AtomicU64::new(1f64.to_bits()),
        };
        params.store(speed, pitch_semitones, gain);
        params
    }

    /// Update all three values (control context only)
    ///
    /// Speed is clamped to `[MIN_SPEED, MAX_SPEED]` and gain to `>= 0`;
    /// non-finite values keep the previous value.
    pub fn store(&self, speed: f64, pitch_semitones: f64, gain: f64) {
        let current = self.load_raw();
        let speed = if speed.is_finite() && speed > 0.0 {
            speed.clamp(MIN_SPEED, MAX_SPEED)
        } else {
            current.0
        };
        let pitch = if pitch_semitones.is_finite() {
            pitch_semitones
        } else {
            current.1
        };
        let gain = if gain.is_finite() { gain.max(0.0) } else { current.2 };

        self.sequence.fetch_add(1, Ordering::AcqRel);
        self.speed.store(speed.to_bits(), Ordering::Release);
        self.pitch_semitones.store(pitch.to_bits(), Ordering::Release);
        self.gain.store(gain.to_bits(), Ordering::Release);
        self.sequence.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_speed(&self, speed: f64) {
        let (_, pitch, gain) = self.load_raw();
        self.store(speed, pitch, gain);
    }

    pub fn set_pitch_semitones(&self, semitones: f64) {
        let (speed, _, gain) = self.load_raw();
        self.store(speed, semitones, gain);
    }

    pub fn set_gain(&self, gain: f64) {
        let (speed, pitch, _) = self.load_raw();
        self.store(speed, pitch, gain);
    }

    /// Read a consistent snapshot (render context)
    pub fn snapshot(&self) -> ParameterSnapshot {
        let mut result = None;
        for _ in 0..SNAPSHOT_RETRIES {
            let before = self.sequence.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let values = self.load_raw();
            let after = self.sequence.load(Ordering::Acquire);
            if before == after {
                result = Some((values, before));
                break;
            }
        }
        let ((speed, pitch_semitones, gain), sequence) =
            result.unwrap_or_else(|| (self.load_raw(), self.sequence.load(Ordering::Acquire)));

        ParameterSnapshot {
            speed,
            pitch_semitones,
            gain,
            version: sequence / 2,
        }
    }

    fn load_raw(&self) -> (f64, f64, f64) {
        (
            f64::from_bits(self.speed.load(Ordering::Acquire)),
            f64::from_bits(self.pitch_semitones.load(Ordering::Acquire)),
            f64::from_bits(self.gain.load(Ordering::Acquire)),
        )
    }
}

impl Default for StretchParameters {
    fn default() -> Self {
        Self::new(1.0, 0.0, 1.0)
    }
}

/// Lock-free playback state for the control context
///
/// Written by the render loop whenever the corresponding state changes.
/// Relaxed ordering except for `commands_applied`, which publishes the rest.
#[derive(Debug, Default)]
pub struct PlaybackAtomics {
    /// Current read position in source frames
    pub position: AtomicU64,
    /// Whether the render loop is consuming source audio
    pub is_playing: AtomicBool,
    /// Whether the loaded session reached its end
    pub stream_ended: AtomicBool,
    /// Frames in the loaded session (0 when none)
    pub total_frames: AtomicU64,
    /// Sample rate of the loaded session (0 when none)
    pub sample_rate: AtomicU32,
    /// Source time of the session clock, as `f64` bits
    pub clock_seconds: AtomicU64,
    /// Commands applied by the render loop so far
    ///
    /// Stored with release ordering after the other fields, so a reader that
    /// sees its own command count also sees the state those commands produced.
    pub commands_applied: AtomicU64,
}

impl PlaybackAtomics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn stream_ended(&self) -> bool {
        self.stream_ended.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Source time the listener is hearing, in seconds
    #[inline]
    pub fn clock_seconds(&self) -> f64 {
        f64::from_bits(self.clock_seconds.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn commands_applied(&self) -> u64 {
        self.commands_applied.load(Ordering::Acquire)
    }

    /// Whether the read position sits at the end of the session
    pub fn at_end(&self) -> bool {
        let total = self.total_frames();
        total > 0 && self.position() >= total
    }

    /// Read position in seconds
    pub fn position_seconds(&self) -> f64 {
        match self.sample_rate() {
            0 => 0.0,
            rate => self.position() as f64 / rate as f64,
        }
    }

    pub(crate) fn publish(
        &self,
        position: usize,
        is_playing: bool,
        stream_ended: bool,
        clock_seconds: f64,
    ) {
        self.position.store(position as u64, Ordering::Relaxed);
        self.clock_seconds.store(clock_seconds.to_bits(), Ordering::Relaxed);
        self.is_playing.store(is_playing, Ordering::Relaxed);
        self.stream_ended.store(stream_ended, Ordering::Relaxed);
    }

    pub(crate) fn acknowledge_commands(&self, count: u64) {
        self.commands_applied.store(count, Ordering::Release);
    }

    pub(crate) fn publish_session(&self, total_frames: usize, sample_rate: u32) {
        self.total_frames.store(total_frames as u64, Ordering::Relaxed);
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_snapshot_reflects_store() {
        let params = StretchParameters::default();
        let first = params.snapshot();
        params.store(2.0, -3.0, 0.5);
        let second = params.snapshot();
        assert_eq!(second.speed, 2.0);
        assert_eq!(second.pitch_semitones, -3.0);
        assert_eq!(second.gain, 0.5);
        assert!(second.version > first.version);
        assert_eq!(params.snapshot().version, second.version);
    }

    #[test]
    fn test_store_clamps_and_ignores_garbage() {
        let params = StretchParameters::new(1.5, 2.0, 1.0);
        params.set_speed(f64::NAN);
        params.set_gain(-4.0);
        let snap = params.snapshot();
        assert_eq!(snap.speed, 1.5);
        assert_eq!(snap.gain, 0.0);

        params.set_speed(1000.0);
        assert_eq!(params.snapshot().speed, MAX_SPEED);
        params.set_speed(0.0);
        assert_eq!(params.snapshot().speed, MAX_SPEED);
        params.set_speed(0.001);
        assert_eq!(params.snapshot().speed, MIN_SPEED);
    }

    #[test]
    fn test_snapshot_is_consistent_under_concurrent_writes() {
        let params = Arc::new(StretchParameters::default());
        let writer = {
            let params = params.clone();
            std::thread::spawn(move || {
                for i in 1..2000 {
                    let v = i as f64;
                    params.store(v / 100.0, v, v);
                }
            })
        };
        for _ in 0..2000 {
            let snap = params.snapshot();
            if snap.version > 1 {
                assert_eq!(snap.pitch_semitones, snap.gain);
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_playback_atomics_position() {
        let atomics = PlaybackAtomics::new();
        atomics.publish_session(44100, 44100);
        atomics.publish(22050, true, false, 0.49);
        assert!((atomics.position_seconds() - 0.5).abs() < 1e-12);
        assert_eq!(atomics.clock_seconds(), 0.49);
        assert!(atomics.is_playing());
        assert!(!atomics.at_end());
        atomics.publish(44100, false, true, 1.0);
        assert!(atomics.at_end());

        atomics.acknowledge_commands(3);
        assert_eq!(atomics.commands_applied(), 3);
    }
}
