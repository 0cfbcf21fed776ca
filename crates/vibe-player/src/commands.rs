//! Line-oriented control commands read from stdin

use anyhow::{anyhow, bail, Result};

pub const HELP: &str = "\
Commands:
  play | p            start playback
  pause | s           pause
  seek <seconds>      jump to a position
  jump <±seconds>     seek relative to the current time
  scrub <seconds>...  seek gesture through each position in turn
  speed <factor>      playback speed (1.0 = normal)
  pitch <semitones>   pitch shift
  gain <linear>       output gain
  status              print state and time
  help                this text
  quit | q            stop and exit";

/// One parsed control line
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Play,
    Pause,
    Seek(f64),
    Jump(f64),
    Scrub(Vec<f64>),
    Speed(f64),
    Pitch(f64),
    Gain(f64),
    Status,
    Help,
    Quit,
}

impl ControlCommand {
    /// Parse a line; `Ok(None)` for blank lines
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "play" | "p" => ControlCommand::Play,
            "pause" | "s" => ControlCommand::Pause,
            "seek" => ControlCommand::Seek(single_number(verb, &args)?),
            "jump" => ControlCommand::Jump(single_number(verb, &args)?),
            "scrub" => {
                if args.is_empty() {
                    bail!("scrub needs at least one position");
                }
                ControlCommand::Scrub(args.iter().map(|a| number(verb, a)).collect::<Result<_>>()?)
            }
            "speed" => ControlCommand::Speed(single_number(verb, &args)?),
            "pitch" => ControlCommand::Pitch(single_number(verb, &args)?),
            "gain" => ControlCommand::Gain(single_number(verb, &args)?),
            "status" => ControlCommand::Status,
            "help" | "?" => ControlCommand::Help,
            "quit" | "q" | "exit" => ControlCommand::Quit,
            other => bail!("unknown command '{}' (try 'help')", other),
        };
        Ok(Some(command))
    }
}

fn single_number(verb: &str, args: &[&str]) -> Result<f64> {
    match args {
        [value] => number(verb, value),
        _ => bail!("{} takes exactly one number", verb),
    }
}

fn number(verb: &str, value: &str) -> Result<f64> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| anyhow!("{}: '{}' is not a number", verb, value))?;
    if !parsed.is_finite() {
        bail!("{}: '{}' is not finite", verb, value);
    }
    Ok(parsed)
}
