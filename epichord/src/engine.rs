//! The engine: the single value threaded through every entry point (per the
//! design's re-architecture cue to prefer one owned value over scattered
//! globals), owning the control state, sequence store, playing-notes table,
//! MIDI port, and the dispatcher thread's lifecycle across `play`/`stop`.

use std::fmt;
use std::io::Read;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::control::{Command, ControlState};
use crate::dispatcher::{self, DispatcherContext, DispatcherFailure};
use crate::error::{CommandError, FatalError, PortError};
use crate::io;
use crate::midi_port::{MidiPort, Packet, PacketList};
use crate::playing_notes::PlayingNotes;
use crate::sequence::{Event, Sequence};
use crate::store::SequenceStore;
use crate::time_map;

/// A command either fails as a user input error (log and continue) or as a
/// fatal error (log and terminate), per the design's three-class taxonomy.
#[derive(Debug)]
pub enum ControlError {
    Command(CommandError),
    Fatal(FatalError),
    Port(PortError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Command(e) => write!(f, "{e}"),
            ControlError::Fatal(e) => write!(f, "{e}"),
            ControlError::Port(e) => write!(f, "{e}"),
        }
    }
}

impl From<CommandError> for ControlError {
    fn from(e: CommandError) -> Self {
        ControlError::Command(e)
    }
}

impl From<FatalError> for ControlError {
    fn from(e: FatalError) -> Self {
        ControlError::Fatal(e)
    }
}

impl From<PortError> for ControlError {
    fn from(e: PortError) -> Self {
        ControlError::Port(e)
    }
}

/// What the caller should do after a successfully-applied command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Continue,
    Tell(String),
    Exit,
    Crash,
}

pub struct Engine {
    config: EngineConfig,
    control: Arc<ControlState>,
    store: Arc<SequenceStore>,
    playing_notes: Arc<Mutex<PlayingNotes>>,
    port: Arc<Mutex<dyn MidiPort>>,
    clock: Arc<dyn Clock>,
    dispatcher_handle: Option<JoinHandle<Result<(), DispatcherFailure>>>,
}

impl Engine {
    pub fn new(config: EngineConfig, port: Arc<Mutex<dyn MidiPort>>, clock: Arc<dyn Clock>) -> Self {
        let control = Arc::new(ControlState::new(config.ticks_per_beat));
        let (store, reclaimer) = SequenceStore::new(Sequence::empty(), config.reclaim_queue_capacity);
        reclaimer.spawn();

        Engine {
            playing_notes: Arc::new(Mutex::new(PlayingNotes::new(config.playing_notes_capacity))),
            control,
            store: Arc::new(store),
            port,
            clock,
            dispatcher_handle: None,
            config,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.control.is_playing()
    }

    /// Apply one parsed command, mutating engine state and/or emitting MIDI
    /// as the command table in the design dictates.
    pub fn apply(&mut self, command: Command) -> Result<CommandOutcome, ControlError> {
        match command {
            Command::Load { sequence_path, tempo_path } => {
                self.load(&sequence_path, &tempo_path)?;
                Ok(CommandOutcome::Continue)
            }
            Command::Play => {
                self.play();
                Ok(CommandOutcome::Continue)
            }
            Command::Stop => {
                self.stop()?;
                Ok(CommandOutcome::Continue)
            }
            Command::Seek(pos) => {
                self.seek(pos.beat);
                Ok(CommandOutcome::Continue)
            }
            Command::CutAll => {
                self.cut_all()?;
                Ok(CommandOutcome::Continue)
            }
            Command::SetLoop { start_beat, end_beat } => {
                self.set_loop(start_beat, end_beat);
                Ok(CommandOutcome::Continue)
            }
            Command::EnableLoop => {
                self.enable_loop()?;
                Ok(CommandOutcome::Continue)
            }
            Command::DisableLoop => {
                self.control.loop_flag.store(false, Ordering::SeqCst);
                Ok(CommandOutcome::Continue)
            }
            Command::TicksPerBeat(n) => {
                self.set_ticks_per_beat(n)?;
                Ok(CommandOutcome::Continue)
            }
            Command::Tell => Ok(CommandOutcome::Tell(format!("{}", self.current_beat()))),
            Command::Execute { status, arg1, arg2 } => {
                self.execute(status, arg1, arg2)?;
                Ok(CommandOutcome::Continue)
            }
            Command::Exit => Ok(CommandOutcome::Exit),
            Command::Crash => Ok(CommandOutcome::Crash),
            Command::Capture => Ok(CommandOutcome::Continue),
        }
    }

    fn load(&mut self, sequence_path: &str, tempo_path: &str) -> Result<(), ControlError> {
        io::check_path_prefix(sequence_path, &self.config.load_path_prefix)?;
        io::check_path_prefix(tempo_path, &self.config.load_path_prefix)?;

        let events = read_records(sequence_path, io::sequence_file::read_events)?;
        let tempo_changes = read_records(tempo_path, io::tempo_file::read_tempo_changes)?;

        let ticks_per_beat = self.control.ticks_per_beat.load(Ordering::SeqCst);
        let sequence = Sequence::new(events, tempo_changes, ticks_per_beat, self.config.default_uspq);
        self.store.publish(sequence);
        Ok(())
    }

    fn play(&mut self) {
        if self.control.is_playing() {
            return;
        }
        self.control.play_flag.store(true, Ordering::SeqCst);

        let ctx = DispatcherContext {
            control: Arc::clone(&self.control),
            store: Arc::clone(&self.store),
            playing_notes: Arc::clone(&self.playing_notes),
            port: Arc::clone(&self.port),
            clock: Arc::clone(&self.clock),
            frame_size_ns: self.config.frame_size_ns,
        };

        let handle = std::thread::Builder::new()
            .name("epichord-dispatcher".to_string())
            .spawn(move || dispatcher::run(&ctx))
            .expect("failed to spawn dispatcher thread");
        self.dispatcher_handle = Some(handle);
    }

    fn stop(&mut self) -> Result<(), ControlError> {
        if !self.control.is_playing() {
            return Ok(());
        }
        self.control.play_flag.store(false, Ordering::SeqCst);
        if let Some(handle) = self.dispatcher_handle.take() {
            match handle.join() {
                Ok(result) => result.map_err(to_control_error)?,
                Err(_) => return Err(ControlError::Fatal(FatalError::DispatcherPanicked)),
            }
        }
        Ok(())
    }

    fn seek(&mut self, beat: f64) {
        let target_ns = self.beat_to_ns(beat);
        if self.control.is_playing() {
            self.control.online_seek_target_ns.store(target_ns, Ordering::SeqCst);
            self.control.online_seek_flag.store(true, Ordering::SeqCst);
            self.wait_one_frame();
        } else {
            self.control.song_ns.store(target_ns, Ordering::SeqCst);
        }
    }

    fn cut_all(&mut self) -> Result<(), ControlError> {
        if self.control.is_playing() {
            self.control.cut_all_flag.store(true, Ordering::SeqCst);
            self.wait_one_frame();
            return Ok(());
        }
        let held = self.playing_notes.lock().expect("playing-notes mutex poisoned").kill_all();
        if held.is_empty() {
            return Ok(());
        }
        let at_ns = self.clock.now_ns();
        let mut list = PacketList::new();
        for (channel, note) in held {
            list.push(Packet::note_off(channel, note, at_ns)).map_err(ControlError::Fatal)?;
        }
        self.port.lock().expect("midi port mutex poisoned").send(&list)?;
        Ok(())
    }

    fn set_loop(&mut self, start_beat: f64, end_beat: f64) {
        let start_ns = self.beat_to_ns(start_beat);
        let end_ns = self.beat_to_ns(end_beat);
        self.control.loop_start_ns.store(start_ns, Ordering::SeqCst);
        self.control.loop_end_ns.store(end_ns, Ordering::SeqCst);
        self.control.loop_initialized.store(true, Ordering::SeqCst);
    }

    fn enable_loop(&mut self) -> Result<(), ControlError> {
        if !self.control.loop_initialized.load(Ordering::SeqCst) {
            return Err(ControlError::Command(CommandError::LoopNotInitialized));
        }
        self.control.loop_flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_ticks_per_beat(&mut self, n: u32) -> Result<(), ControlError> {
        if self.control.is_playing() {
            return Err(ControlError::Command(CommandError::ChangeTimebaseWhilePlaying));
        }
        self.control.ticks_per_beat.store(n, Ordering::SeqCst);
        Ok(())
    }

    fn execute(&mut self, status: u8, arg1: u8, arg2: u8) -> Result<(), ControlError> {
        if self.control.is_playing() {
            // Ignored while playing, per the command table; not an error.
            return Ok(());
        }
        let event = Event::new(0, status, arg1, arg2);
        {
            let mut notes = self.playing_notes.lock().expect("playing-notes mutex poisoned");
            if event.is_note_on() {
                notes.remember(event.channel(), arg1).map_err(ControlError::Fatal)?;
            } else if event.is_note_off() {
                notes.forget(event.channel(), arg1);
            }
        }
        let at_ns = self.clock.now_ns();
        let mut list = PacketList::new();
        list.push(Packet::immediate(status, arg1, arg2, at_ns)).map_err(ControlError::Fatal)?;
        self.port.lock().expect("midi port mutex poisoned").send(&list)?;
        Ok(())
    }

    /// Block the control thread for one dispatch frame: a synchronous
    /// barrier after setting a flag the dispatcher only checks once per
    /// frame, so a second command issued immediately after doesn't race
    /// ahead of the dispatcher noticing the first.
    fn wait_one_frame(&self) {
        let deadline_ns = self.clock.now_ns() + self.config.frame_size_ns;
        self.clock.sleep_until(deadline_ns);
    }

    fn current_beat(&self) -> f64 {
        let ns = self.control.song_ns.load(Ordering::SeqCst);
        let sequence = self.store.snapshot();
        time_map::ns_to_beat(&sequence.tempo_changes, self.config.default_uspq, ns)
    }

    fn beat_to_ns(&self, beat: f64) -> u64 {
        let sequence = self.store.snapshot();
        let ticks_per_beat = self.control.ticks_per_beat.load(Ordering::SeqCst);
        time_map::beat_to_ns(&sequence.tempo_changes, ticks_per_beat, self.config.default_uspq, beat)
    }
}

fn read_records<T>(
    path: &str,
    decode: impl FnOnce(std::fs::File, &str) -> Result<Vec<T>, FatalError>,
) -> Result<Vec<T>, ControlError> {
    let file = std::fs::File::open(path)
        .map_err(|e| CommandError::LoadFailed { path: path.to_string(), reason: e.to_string() })?;
    Ok(decode(file, path)?)
}

fn to_control_error(failure: DispatcherFailure) -> ControlError {
    match failure {
        DispatcherFailure::Fatal(e) => ControlError::Fatal(e),
        DispatcherFailure::Port(e) => ControlError::Port(e),
    }
}
