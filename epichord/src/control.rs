//! Shared control state and the command vocabulary served by the control
//! surface. State is a bundle of atomics in the style of a single "engine"
//! value (see design notes): the control thread is the sole writer of each
//! flag except `song_ns`, which the dispatcher also advances while playing.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::error::CommandError;

/// Default tempo when no tempo change precedes a position: 500,000 µs per
/// quarter note, i.e. 120 BPM.
pub const DEFAULT_USPQ: u32 = 500_000;

/// 20 ms dispatch frame, expressed in nanoseconds.
pub const FRAME_SIZE_NS: u64 = 20_000_000;

/// The small set of shared atomic controls the dispatcher polls once per
/// frame and the control surface mutates in response to commands.
#[derive(Debug)]
pub struct ControlState {
    pub play_flag: AtomicBool,
    pub song_ns: AtomicU64,

    pub online_seek_flag: AtomicBool,
    pub online_seek_target_ns: AtomicU64,

    pub cut_all_flag: AtomicBool,

    pub loop_flag: AtomicBool,
    pub loop_initialized: AtomicBool,
    pub loop_start_ns: AtomicU64,
    pub loop_end_ns: AtomicU64,

    pub ticks_per_beat: AtomicU32,
}

impl ControlState {
    pub fn new(ticks_per_beat: u32) -> Self {
        ControlState {
            play_flag: AtomicBool::new(false),
            song_ns: AtomicU64::new(0),
            online_seek_flag: AtomicBool::new(false),
            online_seek_target_ns: AtomicU64::new(0),
            cut_all_flag: AtomicBool::new(false),
            loop_flag: AtomicBool::new(false),
            loop_initialized: AtomicBool::new(false),
            loop_start_ns: AtomicU64::new(0),
            loop_end_ns: AtomicU64::new(0),
            ticks_per_beat: AtomicU32::new(ticks_per_beat),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.play_flag.load(Ordering::SeqCst)
    }
}

/// A beat position, optionally refined by a ratio (`N P/Q` means `N + P/Q`
/// beats), as accepted by the `seek` command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatPosition {
    pub beat: f64,
}

/// Every control-surface command, parsed from a whitespace-separated line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load { sequence_path: String, tempo_path: String },
    Play,
    Stop,
    Seek(BeatPosition),
    CutAll,
    SetLoop { start_beat: f64, end_beat: f64 },
    EnableLoop,
    DisableLoop,
    TicksPerBeat(u32),
    Tell,
    Execute { status: u8, arg1: u8, arg2: u8 },
    Exit,
    Crash,
    /// `enable-capture` / `disable-capture` / `capture`: parsed so they don't
    /// raise unknown-command errors, but non-functional (no capture path).
    Capture,
}

/// Parse one command line. Unknown commands and malformed arguments are
/// user errors: the caller logs and drops them, the process continues.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (head, rest) = match tokens.split_first() {
        Some((h, r)) => (*h, r),
        None => return Err(CommandError::UnknownCommand(String::new())),
    };

    match head {
        "load" => match rest {
            [seq, tempo] => Ok(Command::Load {
                sequence_path: seq.to_string(),
                tempo_path: tempo.to_string(),
            }),
            _ => Err(malformed("load", line)),
        },
        "play" => Ok(Command::Play),
        "stop" => Ok(Command::Stop),
        "seek" => parse_seek(rest, line),
        "cut-all" => Ok(Command::CutAll),
        "set-loop" => match rest {
            [l0, l1] => {
                let start_beat = parse_f64(l0).ok_or_else(|| malformed("set-loop", line))?;
                let end_beat = parse_f64(l1).ok_or_else(|| malformed("set-loop", line))?;
                Ok(Command::SetLoop { start_beat, end_beat })
            }
            _ => Err(malformed("set-loop", line)),
        },
        "enable-loop" => Ok(Command::EnableLoop),
        "disable-loop" => Ok(Command::DisableLoop),
        "ticks-per-beat" => match rest {
            [n] => {
                let value = n.parse::<i64>().map_err(|_| malformed("ticks-per-beat", line))?;
                if value <= 0 {
                    return Err(CommandError::NonPositiveTicksPerBeat(value));
                }
                Ok(Command::TicksPerBeat(value as u32))
            }
            _ => Err(malformed("ticks-per-beat", line)),
        },
        "tell" => Ok(Command::Tell),
        "execute" => match rest {
            [t, c, a1, a2] => {
                let msg_type = parse_u8(t).ok_or_else(|| malformed("execute", line))?;
                let channel = parse_u8(c).ok_or_else(|| malformed("execute", line))?;
                let arg1 = parse_u8(a1).ok_or_else(|| malformed("execute", line))?;
                let arg2 = parse_u8(a2).ok_or_else(|| malformed("execute", line))?;
                let status = (msg_type << 4) | (channel & 0x0F);
                Ok(Command::Execute { status, arg1, arg2 })
            }
            _ => Err(malformed("execute", line)),
        },
        "exit" => Ok(Command::Exit),
        "crash" => Ok(Command::Crash),
        // Recognized so they don't raise unknown-command errors, matching
        // the original source's silent no-op arms; the capture path itself
        // is non-functional.
        "enable-capture" | "disable-capture" | "capture" => Ok(Command::Capture),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

fn parse_seek(rest: &[&str], raw: &str) -> Result<Command, CommandError> {
    match rest {
        [n] => {
            let beat = parse_f64(n).ok_or_else(|| malformed("seek", raw))?;
            Ok(Command::Seek(BeatPosition { beat }))
        }
        [n, ratio] => {
            let whole = parse_f64(n).ok_or_else(|| malformed("seek", raw))?;
            let (p, q) = ratio.split_once('/').ok_or_else(|| malformed("seek", raw))?;
            let p: f64 = p.parse().map_err(|_| malformed("seek", raw))?;
            let q: f64 = q.parse().map_err(|_| malformed("seek", raw))?;
            if q == 0.0 {
                return Err(malformed("seek", raw));
            }
            Ok(Command::Seek(BeatPosition { beat: whole + p / q }))
        }
        _ => Err(malformed("seek", raw)),
    }
}

fn parse_f64(s: &str) -> Option<f64> {
    s.parse::<f64>().ok()
}

fn parse_u8(s: &str) -> Option<u8> {
    s.parse::<u8>().ok()
}

fn malformed(command: &str, raw: &str) -> CommandError {
    CommandError::MalformedArgs { command: command.to_string(), raw: raw.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("play").unwrap(), Command::Play);
        assert_eq!(parse_command("stop").unwrap(), Command::Stop);
        assert_eq!(parse_command("tell").unwrap(), Command::Tell);
        assert_eq!(parse_command("exit").unwrap(), Command::Exit);
        assert_eq!(parse_command("crash").unwrap(), Command::Crash);
        assert_eq!(parse_command("cut-all").unwrap(), Command::CutAll);
        assert_eq!(parse_command("enable-loop").unwrap(), Command::EnableLoop);
        assert_eq!(parse_command("disable-loop").unwrap(), Command::DisableLoop);
    }

    #[test]
    fn parses_capture_commands_as_no_ops() {
        assert_eq!(parse_command("enable-capture").unwrap(), Command::Capture);
        assert_eq!(parse_command("disable-capture").unwrap(), Command::Capture);
        assert_eq!(parse_command("capture").unwrap(), Command::Capture);
    }

    #[test]
    fn parses_load() {
        let cmd = parse_command("load /tmp/epichord-a.seq /tmp/epichord-a.tempo").unwrap();
        assert_eq!(
            cmd,
            Command::Load {
                sequence_path: "/tmp/epichord-a.seq".to_string(),
                tempo_path: "/tmp/epichord-a.tempo".to_string(),
            }
        );
    }

    #[test]
    fn parses_seek_with_and_without_ratio() {
        assert_eq!(parse_command("seek 8").unwrap(), Command::Seek(BeatPosition { beat: 8.0 }));
        let cmd = parse_command("seek 4 1/2").unwrap();
        assert_eq!(cmd, Command::Seek(BeatPosition { beat: 4.5 }));
    }

    #[test]
    fn rejects_non_positive_ticks_per_beat() {
        let err = parse_command("ticks-per-beat 0").unwrap_err();
        assert_eq!(err, CommandError::NonPositiveTicksPerBeat(0));
        let err = parse_command("ticks-per-beat -5").unwrap_err();
        assert_eq!(err, CommandError::NonPositiveTicksPerBeat(-5));
    }

    #[test]
    fn parses_execute() {
        // type=9 (note on), channel=0 -> status byte 0x90 = 144.
        let cmd = parse_command("execute 9 0 60 100").unwrap();
        assert_eq!(cmd, Command::Execute { status: 144, arg1: 60, arg2: 100 });
    }

    #[test]
    fn parses_execute_composes_channel_into_status() {
        // type=9 (note on), channel=3 -> status byte 0x93 = 147.
        let cmd = parse_command("execute 9 3 60 100").unwrap();
        assert_eq!(cmd, Command::Execute { status: 147, arg1: 60, arg2: 100 });
    }

    #[test]
    fn execute_with_three_tokens_is_malformed() {
        let err = parse_command("execute 144 60 100").unwrap_err();
        assert!(matches!(err, CommandError::MalformedArgs { .. }));
    }

    #[test]
    fn unknown_command_is_a_user_error() {
        let err = parse_command("frobnicate").unwrap_err();
        assert_eq!(err, CommandError::UnknownCommand("frobnicate".to_string()));
    }

    #[test]
    fn malformed_load_is_a_user_error() {
        assert!(parse_command("load onlyonearg").is_err());
    }
}
