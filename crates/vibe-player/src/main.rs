//! Vibe Player - time-stretch playback of a WAV file
//!
//! Decodes the file, opens the output device and drives the player from a
//! line-oriented command prompt on stdin (`help` lists the commands).
//!
//! The orchestrator lives on the main thread; the render loop lives in the
//! audio callback. Stdin is read on its own thread and forwarded over a
//! channel so the main loop can keep polling engine events.

mod commands;
mod config;
mod decode;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{self, Receiver};

use vibe_core::audio::{list_output_devices, start_output, BufferSize, DeviceId};
use vibe_core::config::load_config;
use vibe_core::stretch::SignalsmithLibrary;
use vibe_core::{create_player, PlaybackOrchestrator, PlayerEvent, PlayerState};

use commands::{ControlCommand, HELP};
use config::{player_config_path, PlayerConfig};

/// How often engine events are drained
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for the render loop to install the session
const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "vibe-player", about = "Time-stretch playback of a WAV file")]
struct Cli {
    /// WAV file to play
    #[arg(required_unless_present = "list_devices")]
    file: Option<PathBuf>,

    /// Config file (default: ~/.config/vibe-player/player.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output device name (see --list-devices)
    #[arg(short, long)]
    device: Option<String>,

    /// Device buffer size in frames
    #[arg(short, long)]
    buffer: Option<u32>,

    /// Initial playback speed
    #[arg(long)]
    speed: Option<f64>,

    /// Initial pitch shift in semitones
    #[arg(long)]
    pitch: Option<f64>,

    /// Start playing as soon as the file is loaded
    #[arg(short, long)]
    play: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        for device in list_output_devices().context("Failed to enumerate output devices")? {
            println!("{}", device);
        }
        return Ok(());
    }
    let Some(file) = cli.file.as_deref() else {
        anyhow::bail!("No input file given");
    };

    let config_path = cli.config.clone().unwrap_or_else(player_config_path);
    let mut config: PlayerConfig = load_config(&config_path);
    apply_overrides(&mut config, &cli);

    let source = decode::decode_wav(file)?;
    let sample_rate = source.sample_rate;

    let (mut player, render) = create_player(&config.engine, Arc::new(SignalsmithLibrary::new()));
    let output = start_output(&config.audio, sample_rate, render)
        .context("Failed to start audio output")?;
    if output.sample_rate() != sample_rate {
        log::warn!(
            "Device runs at {}Hz, file is {}Hz: playback will be off-speed",
            output.sample_rate(),
            sample_rate
        );
    }
    log::info!(
        "Output: {} ({} channels, ~{:.1}ms buffer)",
        output.device_name(),
        output.channels(),
        output.latency_ms()
    );

    let events = player.events();
    player.load(source).context("Failed to load audio")?;
    wait_until_ready(&mut player, &events)?;
    if cli.play {
        player.play()?;
    }

    println!("{}", HELP);
    let lines = spawn_stdin_reader();
    let ticker = channel::tick(POLL_INTERVAL);

    loop {
        let quit = crossbeam::select! {
            recv(lines) -> line => match line {
                Ok(line) => handle_line(&mut player, &line),
                Err(_) => {
                    log::info!("stdin closed");
                    true
                }
            },
            recv(ticker) -> _ => {
                player.poll();
                for event in events.try_iter() {
                    report_event(&event);
                }
                false
            }
        };
        if quit {
            break;
        }
    }

    player.teardown().context("Teardown failed")?;
    drop(output);
    log::info!("Vibe Player stopped");
    Ok(())
}

fn apply_overrides(config: &mut PlayerConfig, cli: &Cli) {
    if let Some(name) = &cli.device {
        config.audio.device = Some(DeviceId::new(name.clone()));
    }
    if let Some(frames) = cli.buffer {
        config.audio.buffer_size = BufferSize::Fixed(frames);
    }
    if let Some(speed) = cli.speed {
        config.engine.initial_speed = speed;
    }
    if let Some(pitch) = cli.pitch {
        config.engine.initial_pitch_semitones = pitch;
    }
}

fn wait_until_ready(player: &mut PlaybackOrchestrator, events: &Receiver<PlayerEvent>) -> Result<()> {
    let deadline = Instant::now() + READY_TIMEOUT;
    while player.state() == PlayerState::Loading {
        if Instant::now() >= deadline {
            anyhow::bail!("Audio callback did not pick up the session within {:?}", READY_TIMEOUT);
        }
        std::thread::sleep(POLL_INTERVAL);
        player.poll();
    }
    for event in events.try_iter() {
        report_event(&event);
    }
    if player.state() != PlayerState::Ready {
        anyhow::bail!("Player entered {} while loading", player.state());
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = channel::unbounded();
    let spawned = std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        // The sender is dropped with the closure, so the main loop sees stdin as closed
        log::error!("Failed to spawn stdin reader: {}", e);
    }
    rx
}

/// Run one input line; true when the user asked to quit
fn handle_line(player: &mut PlaybackOrchestrator, line: &str) -> bool {
    match ControlCommand::parse(line) {
        Ok(Some(ControlCommand::Quit)) => true,
        Ok(Some(command)) => {
            run_command(player, command);
            false
        }
        Ok(None) => false,
        Err(e) => {
            println!("{}", e);
            false
        }
    }
}

fn run_command(player: &mut PlaybackOrchestrator, command: ControlCommand) {
    let result = match command {
        ControlCommand::Play => player.play(),
        ControlCommand::Pause => player.pause(),
        ControlCommand::Seek(seconds) => player.seek(seconds),
        ControlCommand::Jump(delta) => player.jump(delta),
        ControlCommand::Scrub(positions) => scrub(player, &positions),
        ControlCommand::Speed(speed) => {
            player.set_speed(speed);
            Ok(())
        }
        ControlCommand::Pitch(semitones) => {
            player.set_pitch(semitones);
            Ok(())
        }
        ControlCommand::Gain(gain) => {
            player.set_gain(gain);
            Ok(())
        }
        ControlCommand::Status => {
            let params = player.params().snapshot();
            println!(
                "{} {:.2}/{:.2}s speed {:.2} pitch {:+.1} gain {:.2}",
                player.state(),
                player.current_time(),
                player.duration(),
                params.speed,
                params.pitch_semitones,
                params.gain
            );
            Ok(())
        }
        ControlCommand::Help => {
            println!("{}", HELP);
            Ok(())
        }
        ControlCommand::Quit => Ok(()),
    };
    if let Err(e) = result {
        println!("{}", e);
    }
}

fn scrub(player: &mut PlaybackOrchestrator, positions: &[f64]) -> vibe_core::EngineResult<()> {
    let Some((last, path)) = positions.split_last() else {
        return Ok(());
    };
    player.begin_seek()?;
    for position in path {
        player.update_seek(*position)?;
        std::thread::sleep(Duration::from_millis(50));
    }
    player.end_seek(*last)
}

fn report_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::Ready { duration_seconds } => println!("ready: {:.2}s", duration_seconds),
        PlayerEvent::PlaybackState { is_playing } => {
            println!("{}", if *is_playing { "playing" } else { "paused" })
        }
        PlayerEvent::TimeUpdate { seconds } => log::debug!("time {:.3}s", seconds),
        PlayerEvent::Error { message } => println!("error: {}", message),
        PlayerEvent::Ended => println!("ended"),
    }
}
