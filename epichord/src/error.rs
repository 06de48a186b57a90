//! The three error classes from the design: user input errors are logged and
//! dropped, capacity/invariant errors and platform errors are fatal. Modeled
//! as plain string-carrying enums in the style of
//! `imbolc-audio::engine::backend::BackendError`, matching this codebase's
//! preference for lightweight manual `Display`/`Error` impls over a
//! derive-macro error crate.

use std::fmt;

/// A malformed or refused command. Logged, command dropped, process continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    UnknownCommand(String),
    MalformedArgs { command: String, raw: String },
    InvalidPathPrefix { path: String, required_prefix: String },
    LoopNotInitialized,
    ChangeTimebaseWhilePlaying,
    NonPositiveTicksPerBeat(i64),
    LoadFailed { path: String, reason: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownCommand(cmd) => write!(f, "unrecognized command ({cmd})"),
            CommandError::MalformedArgs { command, raw } => {
                write!(f, "invalid {command} command ({raw})")
            }
            CommandError::InvalidPathPrefix { path, required_prefix } => write!(
                f,
                "refuse to load file from this location ({path}), must start with {required_prefix}"
            ),
            CommandError::LoopNotInitialized => write!(f, "can't enable loop, not initialized"),
            CommandError::ChangeTimebaseWhilePlaying => {
                write!(f, "not changing ticks per beat while playing")
            }
            CommandError::NonPositiveTicksPerBeat(n) => {
                write!(f, "ignoring setting ticks per beat to {n}")
            }
            CommandError::LoadFailed { path, reason } => {
                write!(f, "could not load {path}: {reason}")
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// A capacity or invariant violation: design-boundary violations where
/// continuing would produce silent musical corruption. Fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    PlayingNotesFull { capacity: usize },
    ReclaimQueueFull { capacity: usize },
    Oversleep { current_ns: u64, deadline_ns: u64 },
    TruncatedRecord { path: String, bytes_read: usize },
    PacketListOverflow,
    DispatcherPanicked,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::PlayingNotesFull { capacity } => {
                write!(f, "remembering too many on-notes (capacity {capacity})")
            }
            FatalError::ReclaimQueueFull { capacity } => {
                write!(f, "garbage has piled up (capacity {capacity})")
            }
            FatalError::Oversleep { current_ns, deadline_ns } => write!(
                f,
                "over slept! game over man! (current={current_ns} deadline={deadline_ns})"
            ),
            FatalError::TruncatedRecord { path, bytes_read } => write!(
                f,
                "{path} data file ends with {bytes_read} bytes not 7"
            ),
            FatalError::PacketListOverflow => write!(f, "unable to add to packet list"),
            FatalError::DispatcherPanicked => write!(f, "dispatcher thread panicked"),
        }
    }
}

impl std::error::Error for FatalError {}

/// An error from the platform MIDI port. Fatal at startup; permits clean
/// termination only if already initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortError(pub String);

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PortError {}

impl From<String> for PortError {
    fn from(s: String) -> Self {
        PortError(s)
    }
}

impl From<std::io::Error> for PortError {
    fn from(e: std::io::Error) -> Self {
        PortError(e.to_string())
    }
}
