//! Real-time MIDI sequencer dispatch engine: converts a musical sequence
//! into wall-clock-scheduled MIDI output while accepting live control
//! commands (play, stop, seek, loop, manual injection, sequence swap).

pub mod clock;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod midi_port;
pub mod playing_notes;
pub mod sequence;
pub mod store;
pub mod time_map;

pub use config::EngineConfig;
pub use control::{Command, ControlState};
pub use engine::{CommandOutcome, ControlError, Engine};
pub use error::{CommandError, FatalError, PortError};
pub use midi_port::{MidiPort, MidirPort, RecordingPort};
pub use sequence::{Event, Sequence, TempoChange};
