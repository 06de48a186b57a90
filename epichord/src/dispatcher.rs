//! The periodic worker: every frame, snapshot the active sequence, observe
//! control flags, compute the frame's musical-time range (handling loop
//! wrap), emit wall-stamped MIDI packets, and sleep to the next frame
//! boundary. Implements the ordered per-frame algorithm in full; runs on its
//! own thread for the duration of one `play`/`stop` cycle.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::control::ControlState;
use crate::error::{FatalError, PortError};
use crate::midi_port::{MidiPort, Packet, PacketList};
use crate::playing_notes::PlayingNotes;
use crate::sequence::Sequence;
use crate::store::SequenceStore;

/// Either kind of fatal failure the dispatcher can surface: a capacity or
/// invariant violation, or a platform MIDI error. Both are fatal per the
/// design's three-class error taxonomy.
#[derive(Debug)]
pub enum DispatcherFailure {
    Fatal(FatalError),
    Port(PortError),
}

impl fmt::Display for DispatcherFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherFailure::Fatal(e) => write!(f, "{e}"),
            DispatcherFailure::Port(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DispatcherFailure {}

impl From<FatalError> for DispatcherFailure {
    fn from(e: FatalError) -> Self {
        DispatcherFailure::Fatal(e)
    }
}

impl From<PortError> for DispatcherFailure {
    fn from(e: PortError) -> Self {
        DispatcherFailure::Port(e)
    }
}

/// Everything the dispatcher thread needs, bundled so a single thread
/// closure can move one value rather than a handful of clones.
pub struct DispatcherContext {
    pub control: Arc<ControlState>,
    pub store: Arc<SequenceStore>,
    pub playing_notes: Arc<Mutex<PlayingNotes>>,
    pub port: Arc<Mutex<dyn MidiPort>>,
    pub clock: Arc<dyn Clock>,
    pub frame_size_ns: u64,
}

/// Emit a note-off for every held note, stamped with `at_ns`, via `port`,
/// and clear the playing-notes table. Shared by every killAll call site in
/// the frame loop.
fn kill_all(
    playing_notes: &mut PlayingNotes,
    port: &mut dyn MidiPort,
    at_ns: u64,
) -> Result<(), DispatcherFailure> {
    let held = playing_notes.kill_all();
    if held.is_empty() {
        return Ok(());
    }
    let mut list = PacketList::new();
    for (channel, note) in held {
        list.push(Packet::note_off(channel, note, at_ns)).map_err(DispatcherFailure::Fatal)?;
    }
    port.send(&list)?;
    Ok(())
}

/// Scan `seq.events` for the half-open tick-time range `[from_ns, to_ns)`,
/// mirror note state into `playing_notes`, and submit one packet list, each
/// packet stamped with `event.at_ns + absolute_song_start_ns` (absolute wall
/// time), per the port contract.
fn dispatch_frame(
    seq: &Sequence,
    from_ns: u64,
    to_ns: u64,
    absolute_song_start_ns: u64,
    playing_notes: &mut PlayingNotes,
    port: &mut dyn MidiPort,
) -> Result<(), DispatcherFailure> {
    let start = seq.events.partition_point(|e| e.at_ns < from_ns);
    let mut list = PacketList::new();
    for event in &seq.events[start..] {
        if event.at_ns >= to_ns {
            break;
        }
        if event.is_note_on() {
            playing_notes
                .remember(event.channel(), event.arg1)
                .map_err(DispatcherFailure::Fatal)?;
        } else if event.is_note_off() {
            playing_notes.forget(event.channel(), event.arg1);
        }
        list.push(Packet::from_event(event, absolute_song_start_ns))
            .map_err(DispatcherFailure::Fatal)?;
    }
    if !list.is_empty() {
        port.send(&list)?;
    }
    Ok(())
}

/// Run the frame loop until `play_flag` clears. Performs the start-up anchor
/// alignment, then the ordered 8-step per-frame algorithm, returning
/// `Ok(())` on a clean stop or the first fatal failure encountered.
pub fn run(ctx: &DispatcherContext) -> Result<(), DispatcherFailure> {
    let mut current_ns = ctx.clock.now_ns();
    let frame = ctx.frame_size_ns;

    let mut absolute_play_head_ns = (current_ns / frame) * frame + frame;
    let mut absolute_leading_edge_ns = absolute_play_head_ns + frame;
    let song_ns_at_start = ctx.control.song_ns.load(Ordering::SeqCst);
    let mut absolute_song_start_ns = absolute_play_head_ns.saturating_sub(song_ns_at_start);

    let mut previous_sequence: Option<Arc<Sequence>> = None;

    loop {
        // 1. Snapshot the sequence handle. If it differs from the snapshot
        // this thread was holding, retire the stale one through the
        // reclaimer instead of letting it drop here: whichever clone is last
        // to go must not free its heap storage on this thread.
        let sequence = ctx.store.snapshot();
        match previous_sequence.take() {
            Some(prev) if Arc::ptr_eq(&prev, &sequence) => {
                previous_sequence = Some(prev);
            }
            Some(prev) => {
                ctx.store.retire(prev)?;
                previous_sequence = Some(Arc::clone(&sequence));
            }
            None => {
                previous_sequence = Some(Arc::clone(&sequence));
            }
        }

        // 2. Stop.
        if !ctx.control.is_playing() {
            let mut notes = ctx.playing_notes.lock().expect("playing-notes mutex poisoned");
            let mut port = ctx.port.lock().expect("midi port mutex poisoned");
            kill_all(&mut notes, &mut *port, absolute_leading_edge_ns)?;
            ctx.control.online_seek_flag.store(false, Ordering::SeqCst);
            return Ok(());
        }

        let mut song_ns = ctx.control.song_ns.load(Ordering::SeqCst);

        // 3. Online seek.
        if ctx.control.online_seek_flag.load(Ordering::SeqCst) {
            {
                let mut notes = ctx.playing_notes.lock().expect("playing-notes mutex poisoned");
                let mut port = ctx.port.lock().expect("midi port mutex poisoned");
                kill_all(&mut notes, &mut *port, absolute_leading_edge_ns)?;
            }
            song_ns = ctx.control.online_seek_target_ns.load(Ordering::SeqCst);
            absolute_play_head_ns = current_ns;
            absolute_leading_edge_ns = absolute_play_head_ns + frame;
            absolute_song_start_ns = absolute_play_head_ns.saturating_sub(song_ns);
            ctx.control.online_seek_flag.store(false, Ordering::SeqCst);
        }

        // 4. Cut-all.
        if ctx.control.cut_all_flag.load(Ordering::SeqCst) {
            let mut notes = ctx.playing_notes.lock().expect("playing-notes mutex poisoned");
            let mut port = ctx.port.lock().expect("midi port mutex poisoned");
            kill_all(&mut notes, &mut *port, absolute_leading_edge_ns)?;
            ctx.control.cut_all_flag.store(false, Ordering::SeqCst);
        }

        // 5. Loop wrap (crossed the boundary since last frame).
        let loop_on = ctx.control.loop_flag.load(Ordering::SeqCst);
        let loop_end_ns = ctx.control.loop_end_ns.load(Ordering::SeqCst);
        let loop_start_ns = ctx.control.loop_start_ns.load(Ordering::SeqCst);
        if loop_on && song_ns > loop_end_ns {
            {
                let mut notes = ctx.playing_notes.lock().expect("playing-notes mutex poisoned");
                let mut port = ctx.port.lock().expect("midi port mutex poisoned");
                kill_all(&mut notes, &mut *port, absolute_leading_edge_ns)?;
            }
            song_ns = loop_start_ns;
            absolute_play_head_ns = current_ns;
            absolute_leading_edge_ns = absolute_play_head_ns + frame;
            absolute_song_start_ns = absolute_play_head_ns.saturating_sub(song_ns);
        }

        // 6. Frame dispatch, with loop-split if this frame would cross the boundary.
        {
            let mut notes = ctx.playing_notes.lock().expect("playing-notes mutex poisoned");
            let mut port = ctx.port.lock().expect("midi port mutex poisoned");

            if loop_on && song_ns + frame > loop_end_ns {
                let overshot = song_ns + frame - loop_end_ns;
                dispatch_frame(
                    &sequence,
                    song_ns,
                    loop_end_ns + 1,
                    absolute_song_start_ns,
                    &mut notes,
                    &mut *port,
                )?;
                absolute_play_head_ns += loop_end_ns - song_ns;
                absolute_song_start_ns = absolute_play_head_ns.saturating_sub(loop_start_ns);
                dispatch_frame(
                    &sequence,
                    loop_start_ns,
                    loop_start_ns + overshot,
                    absolute_song_start_ns,
                    &mut notes,
                    &mut *port,
                )?;
                song_ns = loop_start_ns + overshot;
            } else {
                dispatch_frame(
                    &sequence,
                    song_ns,
                    song_ns + frame,
                    absolute_song_start_ns,
                    &mut notes,
                    &mut *port,
                )?;
                song_ns += frame;
            }
        }

        ctx.control.song_ns.store(song_ns, Ordering::SeqCst);

        // 7. Sleep to the next frame boundary.
        let sleep_target_ns = absolute_play_head_ns.saturating_sub(current_ns);
        absolute_play_head_ns += frame;
        absolute_leading_edge_ns += frame;
        ctx.clock.sleep_until(current_ns + sleep_target_ns);
        current_ns = ctx.clock.now_ns();

        // 8. Oversleep is fatal.
        if current_ns > absolute_play_head_ns {
            return Err(DispatcherFailure::Fatal(FatalError::Oversleep {
                current_ns,
                deadline_ns: absolute_play_head_ns,
            }));
        }
    }
}
