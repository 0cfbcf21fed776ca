//! PlaybackOrchestrator - state machine on the control context
//!
//! Turns user commands into [`EngineCommand`]s for the render loop and
//! engine events back into [`PlayerEvent`]s for the UI. Nothing here blocks
//! except `teardown`, which waits (bounded) for the render loop to hand the
//! session back before its foreign memory is freed.
//!
//! Every discrete control event ends in an explicit seek to the last
//! authoritative time, which resets the stretcher and re-anchors the clock so
//! the audio and the reported time cannot drift apart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::config::EngineConfig;
use crate::engine::{
    command_channel, event_channel, retire_channel, EngineCommand, EngineEvent,
    NativeBufferPool, PlaybackAtomics, PlaybackSession, RenderLoop, RetiredSession,
    StretchEngine, StretchParameters,
};
use crate::error::{CommandChannelError, EngineError, EngineResult, InitializationError};
use crate::stretch::StretchLibrary;
use crate::types::SourceAudio;

use super::state::{PlayerEvent, PlayerState};

/// Pause between retire-queue checks while tearing down
const QUIESCE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Create a player: the orchestrator plus the render loop it drives
///
/// `config` is validated first; the render loop belongs on the audio
/// callback, the orchestrator on the control thread.
pub fn create_player(
    config: &EngineConfig,
    library: Arc<dyn StretchLibrary>,
) -> (PlaybackOrchestrator, RenderLoop) {
    let config = config.validated();
    let (command_tx, command_rx) = command_channel(config.command_queue_capacity);
    let (event_tx, event_rx) = event_channel(config.event_queue_capacity);
    // Every retire is caused by a queued Load or Unload
    let (retire_tx, retire_rx) = retire_channel(config.command_queue_capacity);

    let params = Arc::new(StretchParameters::new(
        config.initial_speed,
        config.initial_pitch_semitones,
        config.initial_gain,
    ));
    let atomics = Arc::new(PlaybackAtomics::new());

    let render = RenderLoop::new(command_rx, event_tx, retire_tx, params.clone(), atomics.clone())
        .with_block_size(config.output_block_size);
    let (player_tx, player_rx) = bounded(config.event_queue_capacity);

    log::info!(
        "Player created: block {} frames, capacity {} frames, {:?} profile",
        config.output_block_size,
        config.block_capacity,
        config.stretch_profile
    );

    let orchestrator = PlaybackOrchestrator {
        pool: NativeBufferPool::new(library),
        config,
        commands: command_tx,
        engine_events: event_rx,
        retired: retire_rx,
        params,
        atomics,
        state: PlayerState::Uninitialized,
        sample_rate: 0,
        total_frames: 0,
        current_time: 0.0,
        ended: false,
        pending_installs: 0,
        sessions_in_flight: 0,
        commands_sent: 0,
        player_tx,
        player_rx,
    };
    (orchestrator, render)
}

/// Control-side state machine of the player
pub struct PlaybackOrchestrator {
    config: EngineConfig,
    pool: NativeBufferPool,
    commands: rtrb::Producer<EngineCommand>,
    engine_events: rtrb::Consumer<EngineEvent>,
    retired: rtrb::Consumer<RetiredSession>,
    params: Arc<StretchParameters>,
    atomics: Arc<PlaybackAtomics>,
    state: PlayerState,
    sample_rate: u32,
    total_frames: usize,
    /// Last authoritative source time in seconds
    current_time: f64,
    ended: bool,
    /// Loads sent but not yet acknowledged by the render loop
    pending_installs: usize,
    /// Sessions sent to the render loop and not yet retired
    sessions_in_flight: usize,
    commands_sent: u64,
    player_tx: Sender<PlayerEvent>,
    player_rx: Receiver<PlayerEvent>,
}

impl PlaybackOrchestrator {
    // ─────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receiver of UI events; clones share one queue
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.player_rx.clone()
    }

    /// Shared stretch parameters (speed, pitch, gain)
    pub fn params(&self) -> &Arc<StretchParameters> {
        &self.params
    }

    /// Render-side state mirror
    pub fn atomics(&self) -> &Arc<PlaybackAtomics> {
        &self.atomics
    }

    /// Duration of the loaded source in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.sample_rate as f64
    }

    /// Source time the listener is hearing
    ///
    /// While playing this is the render loop's clock, once it has applied
    /// every command sent; otherwise the last authoritative time.
    pub fn current_time(&self) -> f64 {
        if self.state == PlayerState::Playing
            && self.pending_installs == 0
            && self.atomics.commands_applied() == self.commands_sent
        {
            return self.atomics.clock_seconds().clamp(0.0, self.duration());
        }
        self.current_time
    }

    /// Foreign channel buffers currently allocated (2 per channel while loaded)
    pub fn live_native_buffers(&self) -> usize {
        self.pool.live_buffers()
    }

    // ─────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Load decoded PCM, replacing any current session
    ///
    /// The stretcher and its buffers are created here; the state becomes
    /// READY once the render loop acknowledges the session (see [`Self::poll`]).
    pub fn load(&mut self, source: SourceAudio) -> EngineResult<()> {
        self.reclaim_retired();
        log::info!(
            "Loading source: {} channels @ {}Hz, {:.2}s",
            source.channel_count(),
            source.sample_rate,
            source.duration_seconds()
        );

        if let Err(e) = validate_source(&source) {
            return Err(self.fail_load(e));
        }

        let snapshot = self.params.snapshot();
        let engine = match StretchEngine::initialize(
            &self.pool,
            source.sample_rate,
            source.channel_count(),
            self.config.block_capacity,
            self.config.stretch_profile.options(),
            snapshot.speed,
            snapshot.pitch_semitones,
        ) {
            Ok(engine) => engine,
            Err(e) => return Err(self.fail_load(e)),
        };

        let sample_rate = source.sample_rate;
        let total_frames = source.total_frames();
        let session = PlaybackSession::new(source, engine, self.config.time_update_hz);

        if let Err(e) = self.send(EngineCommand::Load(Box::new(session))) {
            self.enter_error(&e.to_string());
            return Err(e.into());
        }
        let was_playing = matches!(self.state, PlayerState::Playing | PlayerState::SeekResume);
        self.pending_installs += 1;
        self.sessions_in_flight += 1;
        self.sample_rate = sample_rate;
        self.total_frames = total_frames;
        self.current_time = 0.0;
        self.ended = false;
        self.set_state(PlayerState::Loading);
        if was_playing {
            self.emit(PlayerEvent::PlaybackState { is_playing: false });
        }
        Ok(())
    }

    /// Unload the session and free its native resources
    ///
    /// Blocks until the render loop hands the session back, at most
    /// `quiesce_timeout_ms`.
    pub fn teardown(&mut self) -> EngineResult<()> {
        log::info!("Tearing down player ({})", self.state);
        self.reclaim_retired();

        if self.sessions_in_flight > 0 {
            self.send(EngineCommand::Unload)?;
            let timeout = Duration::from_millis(self.config.quiesce_timeout_ms);
            let deadline = Instant::now() + timeout;
            loop {
                self.reclaim_retired();
                if self.sessions_in_flight == 0 {
                    break;
                }
                if Instant::now() >= deadline {
                    log::error!("Teardown: render loop did not release the session in {:?}", timeout);
                    return Err(CommandChannelError::QuiesceTimeout(timeout).into());
                }
                std::thread::sleep(QUIESCE_POLL_INTERVAL);
            }
        }

        while self.engine_events.pop().is_ok() {}

        let was_playing = matches!(self.state, PlayerState::Playing | PlayerState::SeekResume);
        self.pending_installs = 0;
        self.sample_rate = 0;
        self.total_frames = 0;
        self.current_time = 0.0;
        self.ended = false;
        self.set_state(PlayerState::Uninitialized);
        if was_playing {
            self.emit(PlayerEvent::PlaybackState { is_playing: false });
        }
        log::info!("Teardown complete, {} native buffers live", self.live_native_buffers());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    /// Start playback; from the end of the source, restart at 0
    pub fn play(&mut self) -> EngineResult<()> {
        match self.state {
            PlayerState::Playing => Ok(()),
            PlayerState::Ready => {
                let restart = self.ended || self.at_end();
                self.ensure_slots(if restart { 2 } else { 1 }, "play")?;
                if restart {
                    self.send(EngineCommand::Seek { frame: 0 })?;
                    self.current_time = 0.0;
                    self.ended = false;
                }
                self.send(EngineCommand::Play)?;
                self.set_state(PlayerState::Playing);
                self.emit(PlayerEvent::PlaybackState { is_playing: true });
                Ok(())
            }
            _ => Err(self.reject("play")),
        }
    }

    /// Pause and resynchronize on the current time
    pub fn pause(&mut self) -> EngineResult<()> {
        match self.state {
            PlayerState::Ready => Ok(()),
            PlayerState::Playing => {
                let time = self.current_time();
                self.ensure_slots(2, "pause")?;
                self.send(EngineCommand::Pause)?;
                self.send(EngineCommand::Seek {
                    frame: self.frame_for(time),
                })?;
                self.current_time = time;
                self.set_state(PlayerState::Ready);
                self.emit(PlayerEvent::PlaybackState { is_playing: false });
                Ok(())
            }
            _ => Err(self.reject("pause")),
        }
    }

    /// Jump to `seconds` (clamped to the source)
    pub fn seek(&mut self, seconds: f64) -> EngineResult<()> {
        match self.state {
            PlayerState::Ready | PlayerState::Playing => {
                let time = self.clamp_time(seconds);
                self.seek_to(time)
            }
            PlayerState::SeekHold | PlayerState::SeekResume => self.update_seek(seconds),
            _ => Err(self.reject("seek")),
        }
    }

    /// Seek relative to the current time
    pub fn jump(&mut self, delta_seconds: f64) -> EngineResult<()> {
        let target = self.current_time() + delta_seconds;
        self.seek(target)
    }

    /// Start a seek gesture (scrubbing)
    pub fn begin_seek(&mut self) -> EngineResult<()> {
        match self.state {
            PlayerState::SeekHold | PlayerState::SeekResume => Ok(()),
            PlayerState::Ready => {
                self.set_state(PlayerState::SeekHold);
                Ok(())
            }
            PlayerState::Playing => {
                let time = self.current_time();
                self.ensure_slots(2, "begin_seek")?;
                self.send(EngineCommand::Pause)?;
                self.send(EngineCommand::Seek {
                    frame: self.frame_for(time),
                })?;
                self.current_time = time;
                self.set_state(PlayerState::SeekResume);
                Ok(())
            }
            _ => Err(self.reject("begin_seek")),
        }
    }

    /// Move the position during a seek gesture
    pub fn update_seek(&mut self, seconds: f64) -> EngineResult<()> {
        match self.state {
            PlayerState::SeekHold | PlayerState::SeekResume => {
                let time = self.clamp_time(seconds);
                self.seek_to(time)
            }
            _ => Err(self.reject("update_seek")),
        }
    }

    /// Finish a seek gesture at `seconds`
    ///
    /// Returns to READY, or back to PLAYING when the gesture started there.
    pub fn end_seek(&mut self, seconds: f64) -> EngineResult<()> {
        match self.state {
            PlayerState::SeekHold => {
                let time = self.clamp_time(seconds);
                self.seek_to(time)?;
                self.set_state(PlayerState::Ready);
                Ok(())
            }
            PlayerState::SeekResume => {
                let time = self.clamp_time(seconds);
                self.ensure_slots(2, "end_seek")?;
                self.seek_to(time)?;
                self.send(EngineCommand::Play)?;
                self.set_state(PlayerState::Playing);
                Ok(())
            }
            _ => Err(self.reject("end_seek")),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Live parameters
    // ─────────────────────────────────────────────────────────────

    /// Playback speed (1.0 = normal); applied live on the next callback
    pub fn set_speed(&self, speed: f64) {
        log::debug!("set_speed: {}", speed);
        self.params.set_speed(speed);
    }

    /// Pitch shift in semitones; applied live on the next callback
    pub fn set_pitch(&self, semitones: f64) {
        log::debug!("set_pitch: {} semitones", semitones);
        self.params.set_pitch_semitones(semitones);
    }

    /// Linear output gain
    pub fn set_gain(&self, gain: f64) {
        log::debug!("set_gain: {}", gain);
        self.params.set_gain(gain);
    }

    // ─────────────────────────────────────────────────────────────
    // Engine feedback
    // ─────────────────────────────────────────────────────────────

    /// Drop retired sessions and handle pending engine events
    ///
    /// Call regularly from the control context. Returns the number of engine
    /// events handled.
    pub fn poll(&mut self) -> usize {
        self.reclaim_retired();
        let mut handled = 0;
        while let Ok(event) = self.engine_events.pop() {
            handled += 1;
            self.handle_engine_event(event);
        }
        handled
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SessionInstalled => {
                self.pending_installs = self.pending_installs.saturating_sub(1);
                if self.pending_installs == 0 && self.state == PlayerState::Loading {
                    log::info!("Session ready: {:.2}s @ {}Hz", self.duration(), self.sample_rate);
                    self.set_state(PlayerState::Ready);
                    self.emit(PlayerEvent::Ready {
                        duration_seconds: self.duration(),
                    });
                }
            }
            EngineEvent::TimeUpdate { sample, applied } => {
                if self.is_current(applied) && self.state == PlayerState::Playing {
                    self.current_time = sample.source_time_seconds.clamp(0.0, self.duration());
                    self.emit(PlayerEvent::TimeUpdate {
                        seconds: self.current_time,
                    });
                }
            }
            EngineEvent::PlaybackEnded { applied } => {
                if self.is_current(applied) && self.state == PlayerState::Playing {
                    log::info!("Playback ended");
                    self.ended = true;
                    self.current_time = self.duration();
                    self.set_state(PlayerState::Ready);
                    self.emit(PlayerEvent::Ended);
                    self.emit(PlayerEvent::PlaybackState { is_playing: false });
                }
            }
            EngineEvent::Error { error, consecutive } => {
                if self.pending_installs > 0 || self.state == PlayerState::Error {
                    return;
                }
                if consecutive >= self.config.max_consecutive_errors {
                    log::error!("{} consecutive processing failures, halting: {}", consecutive, error);
                    self.enter_error(&format!(
                        "{} ({} consecutive failures)",
                        error, consecutive
                    ));
                } else {
                    log::warn!("Processing error ({} in a row): {}", consecutive, error);
                    self.emit(PlayerEvent::Error {
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    fn seek_to(&mut self, time: f64) -> EngineResult<()> {
        self.send(EngineCommand::Seek {
            frame: self.frame_for(time),
        })?;
        self.current_time = time;
        self.ended = false;
        self.emit(PlayerEvent::TimeUpdate { seconds: time });
        Ok(())
    }

    fn send(&mut self, cmd: EngineCommand) -> Result<(), CommandChannelError> {
        match self.commands.push(cmd) {
            Ok(()) => {
                self.commands_sent += 1;
                Ok(())
            }
            Err(rtrb::PushError::Full(cmd)) => {
                log::warn!("Command queue full, dropping {}", cmd.name());
                Err(CommandChannelError::QueueFull(cmd.name()))
            }
        }
    }

    /// Fail before sending anything when a multi-command step would not fit
    fn ensure_slots(&self, needed: usize, command: &'static str) -> Result<(), CommandChannelError> {
        if self.commands.slots() < needed {
            log::warn!("Command queue full, dropping {}", command);
            return Err(CommandChannelError::QueueFull(command));
        }
        Ok(())
    }

    fn reclaim_retired(&mut self) {
        while let Ok(session) = self.retired.pop() {
            self.sessions_in_flight = self.sessions_in_flight.saturating_sub(1);
            log::debug!(
                "Dropping retired session ({} frames @ {}Hz)",
                session.total_frames(),
                session.sample_rate()
            );
            drop(session);
        }
    }

    fn fail_load(&mut self, error: InitializationError) -> EngineError {
        log::error!("Load failed: {}", error);
        self.enter_error(&error.to_string());
        error.into()
    }

    /// Enter ERROR; a session still held by the render loop is halted
    fn enter_error(&mut self, message: &str) {
        let was_playing = matches!(self.state, PlayerState::Playing | PlayerState::SeekResume);
        if self.sessions_in_flight > 0 {
            if let Err(e) = self.send(EngineCommand::Halt) {
                log::error!("Failed to halt render loop: {}", e);
            }
        }
        self.set_state(PlayerState::Error);
        self.emit(PlayerEvent::Error {
            message: message.to_string(),
        });
        if was_playing {
            self.emit(PlayerEvent::PlaybackState { is_playing: false });
        }
    }

    /// Whether an engine event was pushed after every command sent so far
    fn is_current(&self, applied: u64) -> bool {
        self.pending_installs == 0 && applied >= self.commands_sent
    }

    fn reject(&self, command: &'static str) -> EngineError {
        log::warn!("Rejected '{}' in state {}", command, self.state);
        EngineError::InvalidState {
            command,
            state: self.state,
        }
    }

    fn set_state(&mut self, state: PlayerState) {
        if self.state != state {
            log::debug!("PlayerState: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if let Err(TrySendError::Full(event)) = self.player_tx.try_send(event) {
            log::debug!("Player event queue full, dropping {:?}", event);
        }
    }

    fn clamp_time(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() {
            return self.current_time;
        }
        seconds.clamp(0.0, self.duration())
    }

    fn frame_for(&self, seconds: f64) -> usize {
        ((seconds * self.sample_rate as f64).round() as usize).min(self.total_frames)
    }

    fn at_end(&self) -> bool {
        self.total_frames > 0 && self.frame_for(self.current_time) >= self.total_frames
    }
}

fn validate_source(source: &SourceAudio) -> Result<(), InitializationError> {
    if source.sample_rate == 0 {
        return Err(InitializationError::InvalidSampleRate(source.sample_rate));
    }
    if source.channel_count() == 0 {
        return Err(InitializationError::InvalidChannelCount(0));
    }
    if !source.is_rectangular() {
        return Err(InitializationError::InvalidSource(
            "channels have different lengths".to_string(),
        ));
    }
    if source.total_frames() == 0 {
        return Err(InitializationError::InvalidSource("no frames".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{constant_source, MockLibrary, MockStats};
    use crate::types::PlanarBuffer;
    use std::sync::atomic::{AtomicBool, Ordering};

    const BLOCK: usize = 128;

    struct Rig {
        player: PlaybackOrchestrator,
        render: RenderLoop,
        library: Arc<MockLibrary>,
        output: PlanarBuffer,
        events: Receiver<PlayerEvent>,
    }

    fn rig_with(config: EngineConfig) -> Rig {
        let library = Arc::new(MockLibrary::new());
        let (player, render) = create_player(&config, library.clone());
        let events = player.events();
        let mut output = PlanarBuffer::with_capacity(2, BLOCK);
        output.set_len_from_capacity(BLOCK);
        Rig {
            player,
            render,
            library,
            output,
            events,
        }
    }

    fn rig() -> Rig {
        rig_with(EngineConfig::default())
    }

    impl Rig {
        /// Run `n` callbacks, polling after each; true if any carried sound
        fn pump(&mut self, n: usize) -> bool {
            let mut audible = false;
            for _ in 0..n {
                self.render.render(&mut self.output);
                audible |= !self.output.is_silent();
                self.player.poll();
            }
            audible
        }

        fn drain(&self) -> Vec<PlayerEvent> {
            self.events.try_iter().collect()
        }

        fn loaded(seconds: f64) -> Rig {
            let mut rig = rig();
            rig.player.load(constant_source(44100, 2, seconds)).unwrap();
            rig.pump(1);
            assert_eq!(rig.player.state(), PlayerState::Ready);
            rig.drain();
            rig
        }
    }

    #[test]
    fn test_load_becomes_ready_on_ack() {
        let mut rig = rig();
        rig.player.load(constant_source(44100, 2, 2.0)).unwrap();
        assert_eq!(rig.player.state(), PlayerState::Loading);
        assert_eq!(rig.player.live_native_buffers(), 4);

        rig.pump(1);
        assert_eq!(rig.player.state(), PlayerState::Ready);
        assert_eq!(rig.drain(), vec![PlayerEvent::Ready { duration_seconds: 2.0 }]);
        assert_eq!(rig.player.duration(), 2.0);
    }

    #[test]
    fn test_commands_rejected_before_load() {
        let mut rig = rig();
        assert_eq!(
            rig.player.play(),
            Err(EngineError::InvalidState {
                command: "play",
                state: PlayerState::Uninitialized
            })
        );
        assert!(rig.player.seek(1.0).is_err());
        assert!(rig.player.begin_seek().is_err());
        assert_eq!(rig.player.state(), PlayerState::Uninitialized);
    }

    #[test]
    fn test_invalid_source_enters_error_until_next_load() {
        let mut rig = rig();
        let ragged = SourceAudio::new(44100, vec![vec![0.1; 10], vec![0.1; 9]]);
        let err = rig.player.load(ragged).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Initialization(InitializationError::InvalidSource(_))
        ));
        assert_eq!(rig.player.state(), PlayerState::Error);
        assert!(matches!(rig.drain().as_slice(), [PlayerEvent::Error { .. }]));
        assert!(rig.player.play().is_err());

        rig.player.load(constant_source(44100, 1, 1.0)).unwrap();
        rig.pump(1);
        assert_eq!(rig.player.state(), PlayerState::Ready);
    }

    #[test]
    fn test_failed_load_while_playing_halts_audio() {
        let mut rig = Rig::loaded(5.0);
        rig.player.play().unwrap();
        assert!(rig.pump(5));
        rig.drain();

        let ragged = SourceAudio::new(44100, vec![vec![0.1; 10], vec![0.1; 9]]);
        assert!(rig.player.load(ragged).is_err());
        assert_eq!(rig.player.state(), PlayerState::Error);
        assert!(rig
            .drain()
            .contains(&PlayerEvent::PlaybackState { is_playing: false }));
        assert!(!rig.pump(5));
        assert!(rig.player.pause().is_err());

        rig.player.load(constant_source(44100, 2, 1.0)).unwrap();
        rig.pump(1);
        assert_eq!(rig.player.state(), PlayerState::Ready);
        rig.player.play().unwrap();
        assert!(rig.pump(1));
    }

    #[test]
    fn test_reload_while_playing_reports_stopped() {
        let mut rig = Rig::loaded(5.0);
        rig.player.play().unwrap();
        rig.pump(2);
        rig.drain();

        rig.player.load(constant_source(44100, 2, 3.0)).unwrap();
        assert_eq!(rig.player.state(), PlayerState::Loading);
        assert_eq!(
            rig.drain(),
            vec![PlayerEvent::PlaybackState { is_playing: false }]
        );
        rig.pump(1);
        assert_eq!(rig.player.state(), PlayerState::Ready);
        assert_eq!(rig.drain(), vec![PlayerEvent::Ready { duration_seconds: 3.0 }]);
    }

    #[test]
    fn test_create_failure_enters_error() {
        let mut rig = rig();
        rig.library.stats.fail_create.store(true, Ordering::SeqCst);
        let err = rig.player.load(constant_source(44100, 1, 1.0)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Initialization(InitializationError::CreateFailed { .. })
        ));
        assert_eq!(rig.player.state(), PlayerState::Error);
        assert_eq!(rig.player.live_native_buffers(), 0);
    }

    #[test]
    fn test_play_reports_time_after_one_second() {
        let mut rig = Rig::loaded(10.0);
        rig.player.play().unwrap();
        assert_eq!(rig.player.state(), PlayerState::Playing);
        assert_eq!(rig.drain(), vec![PlayerEvent::PlaybackState { is_playing: true }]);

        assert!(rig.pump((44100 + BLOCK - 1) / BLOCK));
        assert!((rig.player.current_time() - 1.0).abs() < 0.05);

        let updates: Vec<f64> = rig
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                PlayerEvent::TimeUpdate { seconds } => Some(seconds),
                _ => None,
            })
            .collect();
        assert!(updates.len() >= 14);
        assert!(updates.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_pause_resyncs_and_goes_silent() {
        let mut rig = Rig::loaded(10.0);
        rig.player.play().unwrap();
        rig.pump(3 * 44100 / BLOCK);
        let before = rig.player.current_time();

        rig.player.pause().unwrap();
        assert_eq!(rig.player.state(), PlayerState::Ready);
        assert!((rig.player.current_time() - before).abs() < 1e-9);
        assert!(!rig.pump(20));
        assert!((rig.player.current_time() - before).abs() < 1e-9);
        assert_eq!(
            rig.render.session().unwrap().current_read_frame(),
            (before * 44100.0).round() as usize
        );

        let resets = MockStats::get(&rig.library.stats.resets);
        rig.player.play().unwrap();
        assert!(rig.pump(1));
        assert_eq!(MockStats::get(&rig.library.stats.resets), resets + 1);
    }

    #[test]
    fn test_end_of_stream_returns_to_ready_and_restarts() {
        let mut rig = Rig::loaded(0.2);
        rig.player.play().unwrap();
        let mut ended = false;
        for _ in 0..200 {
            rig.pump(1);
            if rig.drain().contains(&PlayerEvent::Ended) {
                ended = true;
                break;
            }
        }
        assert!(ended);
        assert_eq!(rig.player.state(), PlayerState::Ready);
        assert_eq!(rig.player.current_time(), rig.player.duration());

        rig.player.play().unwrap();
        assert_eq!(rig.player.current_time(), 0.0);
        rig.pump(200);
        assert_eq!(MockStats::get(&rig.library.stats.final_calls), 2);
        assert_eq!(rig.player.state(), PlayerState::Ready);
    }

    #[test]
    fn test_seek_gesture_while_playing_resumes() {
        let mut rig = Rig::loaded(10.0);
        rig.player.play().unwrap();
        rig.pump(10);

        let held = rig.player.current_time();
        rig.player.begin_seek().unwrap();
        assert_eq!(rig.player.state(), PlayerState::SeekResume);
        // Buffered output is discarded as soon as the gesture starts
        assert!(!rig.pump(1));
        assert_eq!(rig.player.current_time(), held);
        rig.player.update_seek(2.0).unwrap();
        assert!(!rig.pump(5));
        rig.player.end_seek(4.0).unwrap();
        assert_eq!(rig.player.state(), PlayerState::Playing);
        rig.drain();

        assert!(rig.pump(1));
        let first = rig
            .drain()
            .into_iter()
            .find_map(|e| match e {
                PlayerEvent::TimeUpdate { seconds } => Some(seconds),
                _ => None,
            })
            .unwrap();
        assert!((first - 4.0).abs() < 1.0 / 15.0);
    }

    #[test]
    fn test_time_updates_queued_before_seek_are_dropped() {
        let mut rig = Rig::loaded(10.0);
        rig.player.play().unwrap();
        rig.drain();
        // The control thread falls behind: callbacks run without polling
        for _ in 0..30 {
            rig.render.render(&mut rig.output);
        }

        rig.player.seek(8.0).unwrap();
        rig.player.poll();
        assert_eq!(rig.drain(), vec![PlayerEvent::TimeUpdate { seconds: 8.0 }]);
        assert_eq!(rig.player.current_time(), 8.0);

        assert!(rig.pump(1));
        let updates: Vec<f64> = rig
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                PlayerEvent::TimeUpdate { seconds } => Some(seconds),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 1);
        assert!((updates[0] - 8.0).abs() < 1.0 / 15.0);
    }

    #[test]
    fn test_seek_gesture_from_ready_stays_paused() {
        let mut rig = Rig::loaded(10.0);
        rig.player.begin_seek().unwrap();
        assert_eq!(rig.player.state(), PlayerState::SeekHold);
        assert!(rig.player.play().is_err());
        rig.player.update_seek(3.0).unwrap();
        rig.player.end_seek(1.5).unwrap();
        assert_eq!(rig.player.state(), PlayerState::Ready);
        assert_eq!(rig.player.current_time(), 1.5);
        assert!(!rig.pump(5));
        assert_eq!(rig.render.session().unwrap().current_read_frame(), 66150);
    }

    #[test]
    fn test_seek_and_jump_clamp_to_source() {
        let mut rig = Rig::loaded(10.0);
        rig.player.seek(5.0).unwrap();
        rig.player.jump(-2.0).unwrap();
        assert_eq!(rig.player.current_time(), 3.0);
        rig.player.jump(-10.0).unwrap();
        assert_eq!(rig.player.current_time(), 0.0);
        rig.player.jump(100.0).unwrap();
        assert_eq!(rig.player.current_time(), 10.0);
        rig.player.seek(f64::NAN).unwrap();
        assert_eq!(rig.player.current_time(), 10.0);
        assert_eq!(
            rig.drain().last(),
            Some(&PlayerEvent::TimeUpdate { seconds: 10.0 })
        );
    }

    #[test]
    fn test_speed_change_keeps_state_and_skips_reset() {
        let mut rig = Rig::loaded(10.0);
        rig.player.play().unwrap();
        rig.pump(10);
        let resets = MockStats::get(&rig.library.stats.resets);

        rig.player.set_speed(2.0);
        rig.player.set_pitch(-2.0);
        rig.player.set_gain(0.5);
        assert!(rig.pump(1));
        assert_eq!(rig.player.state(), PlayerState::Playing);
        assert_eq!(MockStats::get(&rig.library.stats.resets), resets);
        assert_eq!(rig.output.channel(0)[BLOCK - 1], 0.125);
    }

    #[test]
    fn test_repeated_processing_errors_are_fatal() {
        let mut rig = rig_with(EngineConfig {
            max_consecutive_errors: 3,
            ..EngineConfig::default()
        });
        rig.player.load(constant_source(44100, 1, 5.0)).unwrap();
        rig.pump(1);
        rig.player.play().unwrap();
        rig.pump(1);
        rig.drain();

        rig.library.stats.fail_process.store(true, Ordering::SeqCst);
        rig.pump(10);
        assert_eq!(rig.player.state(), PlayerState::Error);
        let errors = rig
            .drain()
            .into_iter()
            .filter(|e| matches!(e, PlayerEvent::Error { .. }))
            .count();
        assert_eq!(errors, 3);
        assert!(matches!(
            rig.player.play(),
            Err(EngineError::InvalidState {
                state: PlayerState::Error,
                ..
            })
        ));

        // Halted: the render loop stops calling into the stretcher
        let calls = MockStats::get(&rig.library.stats.process_calls);
        assert!(!rig.pump(5));
        assert_eq!(MockStats::get(&rig.library.stats.process_calls), calls);

        rig.library.stats.fail_process.store(false, Ordering::SeqCst);
        rig.player.load(constant_source(44100, 1, 1.0)).unwrap();
        rig.pump(1);
        assert_eq!(rig.player.state(), PlayerState::Ready);
        rig.player.play().unwrap();
        assert!(rig.pump(1));
    }

    #[test]
    fn test_reload_frees_previous_session() {
        let mut rig = Rig::loaded(1.0);
        rig.player.load(constant_source(44100, 1, 2.0)).unwrap();
        // Old stereo session still alive until the render loop retires it
        assert_eq!(rig.player.live_native_buffers(), 6);
        rig.pump(1);
        assert_eq!(rig.player.live_native_buffers(), 2);
        assert_eq!(rig.player.duration(), 2.0);
    }

    #[test]
    fn test_teardown_waits_for_render_thread() {
        let rig = Rig::loaded(5.0);
        let Rig {
            mut player,
            mut render,
            library,
            mut output,
            ..
        } = rig;
        player.play().unwrap();
        assert_eq!(player.live_native_buffers(), 4);

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    render.render(&mut output);
                    std::thread::sleep(Duration::from_micros(200));
                }
                render
            })
        };

        player.teardown().unwrap();
        assert_eq!(player.state(), PlayerState::Uninitialized);
        assert_eq!(player.live_native_buffers(), 0);
        assert_eq!(MockStats::get(&library.stats.live_allocations), 0);

        stop.store(true, Ordering::SeqCst);
        let render = thread.join().unwrap();
        assert!(!render.has_session());
    }

    #[test]
    fn test_teardown_times_out_without_render_loop() {
        let mut rig = rig_with(EngineConfig {
            quiesce_timeout_ms: 20,
            ..EngineConfig::default()
        });
        rig.player.load(constant_source(44100, 1, 1.0)).unwrap();
        assert_eq!(
            rig.player.teardown(),
            Err(EngineError::CommandChannel(CommandChannelError::QuiesceTimeout(
                Duration::from_millis(20)
            )))
        );
        assert_eq!(rig.player.live_native_buffers(), 2);
    }

    #[test]
    fn test_teardown_without_session_is_immediate() {
        let mut rig = rig();
        rig.player.teardown().unwrap();
        assert_eq!(rig.player.state(), PlayerState::Uninitialized);
    }

    #[test]
    fn test_full_command_queue_reports_error() {
        let mut rig = rig_with(EngineConfig {
            command_queue_capacity: 2,
            ..EngineConfig::default()
        });
        rig.player.load(constant_source(44100, 1, 5.0)).unwrap();
        rig.pump(1);
        rig.player.seek(1.0).unwrap();
        rig.player.seek(2.0).unwrap();
        assert_eq!(
            rig.player.seek(3.0),
            Err(EngineError::CommandChannel(CommandChannelError::QueueFull("seek")))
        );
        assert_eq!(rig.player.current_time(), 2.0);

        rig.pump(1);
        rig.player.seek(3.0).unwrap();
    }
}
