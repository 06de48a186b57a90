//! The six literal scenarios: driven directly against the dispatcher and
//! its collaborators (not the stdin-facing `Engine`) so each test can seed
//! control state exactly as the scenario describes, with a `RecordingPort`
//! and `FakeClock` standing in for the platform.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use epichord::clock::{Clock, FakeClock};
use epichord::control::ControlState;
use epichord::dispatcher::{self, DispatcherContext};
use epichord::midi_port::{MidiPort, RecordingPort};
use epichord::playing_notes::PlayingNotes;
use epichord::sequence::{Event, Sequence, TempoChange};
use epichord::store::SequenceStore;

const FRAME_SIZE_NS: u64 = 20_000_000;
const TICKS_PER_BEAT: u32 = 384;
const DEFAULT_USPQ: u32 = 500_000;

fn spawn_dispatcher(
    control: Arc<ControlState>,
    store: Arc<SequenceStore>,
    playing_notes: Arc<Mutex<PlayingNotes>>,
    port: Arc<Mutex<dyn MidiPort>>,
    clock: Arc<dyn Clock>,
) -> std::thread::JoinHandle<Result<(), dispatcher::DispatcherFailure>> {
    let ctx = DispatcherContext { control, store, playing_notes, port, clock, frame_size_ns: FRAME_SIZE_NS };
    std::thread::spawn(move || dispatcher::run(&ctx))
}

fn recording_port() -> (Arc<Mutex<RecordingPort>>, Arc<Mutex<dyn MidiPort>>) {
    let port = Arc::new(Mutex::new(RecordingPort::new()));
    let dyn_port: Arc<Mutex<dyn MidiPort>> = port.clone();
    (port, dyn_port)
}

/// Scenario 1: empty sequence. Dispatcher runs emitting nothing; `stop`
/// terminates cleanly with no packets sent.
#[test]
fn empty_sequence_emits_nothing_and_stops_cleanly() {
    let control = Arc::new(ControlState::new(TICKS_PER_BEAT));
    let (store, reclaimer) = SequenceStore::new(Sequence::empty(), 32);
    let store = Arc::new(store);
    std::thread::spawn(move || reclaimer.run());
    let playing_notes = Arc::new(Mutex::new(PlayingNotes::new(1024)));
    let (port, dyn_port) = recording_port();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));

    control.play_flag.store(true, Ordering::SeqCst);
    let handle = spawn_dispatcher(
        Arc::clone(&control),
        Arc::clone(&store),
        Arc::clone(&playing_notes),
        dyn_port,
        Arc::clone(&clock),
    );

    std::thread::sleep(Duration::from_millis(5));
    // the fake clock's instant sleep_until lets the loop run far ahead of
    // real time; by now several seconds of song time have elapsed.
    assert!(control.song_ns.load(Ordering::SeqCst) >= 1_000_000_000);

    control.play_flag.store(false, Ordering::SeqCst);
    handle.join().unwrap().unwrap();
    assert!(port.lock().unwrap().sent.is_empty());
}

/// Scenario 2: single note. Expect note-on then matching note-off, in order.
#[test]
fn single_note_dispatches_matching_on_and_off() {
    let events = vec![Event::new(0, 0x90, 60, 100), Event::new(384, 0x80, 60, 0)];
    let sequence = Sequence::new(events, vec![], TICKS_PER_BEAT, DEFAULT_USPQ);

    let control = Arc::new(ControlState::new(TICKS_PER_BEAT));
    let (store, reclaimer) = SequenceStore::new(sequence, 32);
    let store = Arc::new(store);
    std::thread::spawn(move || reclaimer.run());
    let playing_notes = Arc::new(Mutex::new(PlayingNotes::new(1024)));
    let (port, dyn_port) = recording_port();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));

    control.play_flag.store(true, Ordering::SeqCst);
    let handle =
        spawn_dispatcher(Arc::clone(&control), store, Arc::clone(&playing_notes), dyn_port, clock);

    std::thread::sleep(Duration::from_millis(5));
    control.play_flag.store(false, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    let sent = port.lock().unwrap().sent.clone();
    assert!(sent.iter().any(|p| p.bytes == vec![0x90, 60, 100]));
    assert!(sent.iter().any(|p| p.bytes == vec![0x80, 60, 0]));
    assert!(playing_notes.lock().unwrap().is_empty());
}

/// Scenario 3: tempo change mid-sequence. Note order (60 then 62) is
/// preserved across the tempo boundary.
#[test]
fn tempo_change_preserves_emission_order() {
    let events = vec![
        Event::new(0, 0x90, 60, 100),
        Event::new(384, 0x90, 62, 100),
        Event::new(768, 0x80, 62, 0),
    ];
    let changes = vec![TempoChange::new(0, 500_000), TempoChange::new(384, 250_000)];
    let sequence = Sequence::new(events, changes, TICKS_PER_BEAT, DEFAULT_USPQ);

    let control = Arc::new(ControlState::new(TICKS_PER_BEAT));
    let (store, reclaimer) = SequenceStore::new(sequence, 32);
    let store = Arc::new(store);
    std::thread::spawn(move || reclaimer.run());
    let playing_notes = Arc::new(Mutex::new(PlayingNotes::new(1024)));
    let (port, dyn_port) = recording_port();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));

    control.play_flag.store(true, Ordering::SeqCst);
    let handle = spawn_dispatcher(Arc::clone(&control), store, playing_notes, dyn_port, clock);

    std::thread::sleep(Duration::from_millis(5));
    control.play_flag.store(false, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    let sent = port.lock().unwrap().sent.clone();
    let pos_60 = sent.iter().position(|p| p.bytes == vec![0x90, 60, 100]).unwrap();
    let pos_62 = sent.iter().position(|p| p.bytes == vec![0x90, 62, 100]).unwrap();
    assert!(pos_60 < pos_62);
}

/// Scenario 4: loop wrap. Starting past the loop endpoint, the dispatcher
/// must kill any hanging note, reset the playhead to the loop start, and
/// leave no stuck notes.
#[test]
fn loop_wrap_splits_frame_and_clears_hanging_notes() {
    // A note-on at tick 0 with no note-off: it will be hanging when the loop wraps.
    let events = vec![Event::new(0, 0x90, 60, 100)];
    let sequence = Sequence::new(events, vec![], TICKS_PER_BEAT, DEFAULT_USPQ);

    let control = Arc::new(ControlState::new(TICKS_PER_BEAT));
    // Past the loop endpoint already (e.g. the position a prior seek left it
    // at): the very first frame's step-5 check fires the wrap immediately.
    control.song_ns.store(510_000_000, Ordering::SeqCst);
    control.loop_flag.store(true, Ordering::SeqCst);
    control.loop_initialized.store(true, Ordering::SeqCst);
    control.loop_start_ns.store(0, Ordering::SeqCst);
    control.loop_end_ns.store(500_000_000, Ordering::SeqCst);

    let (store, reclaimer) = SequenceStore::new(sequence, 32);
    let store = Arc::new(store);
    std::thread::spawn(move || reclaimer.run());
    let playing_notes = Arc::new(Mutex::new(PlayingNotes::new(1024)));
    // Seed the hanging note as though it sounded in an earlier pass.
    playing_notes.lock().unwrap().remember(0, 60).unwrap();
    let (port, dyn_port) = recording_port();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));

    control.play_flag.store(true, Ordering::SeqCst);
    let handle =
        spawn_dispatcher(Arc::clone(&control), store, Arc::clone(&playing_notes), dyn_port, clock);

    std::thread::sleep(Duration::from_millis(5));
    control.play_flag.store(false, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    let sent = port.lock().unwrap().sent.clone();
    assert!(sent.iter().any(|p| p.bytes == vec![0x80, 60, 0]), "expected a note-off from the loop wrap kill-all");
    assert!(playing_notes.lock().unwrap().is_empty());
}

/// Scenario 5: online seek while playing. A hanging note must be killed and
/// the playhead must land at the seek target.
#[test]
fn online_seek_kills_hanging_notes_and_relocates_playhead() {
    let sequence = Sequence::empty();
    let control = Arc::new(ControlState::new(TICKS_PER_BEAT));
    let (store, reclaimer) = SequenceStore::new(sequence, 32);
    let store = Arc::new(store);
    std::thread::spawn(move || reclaimer.run());
    let playing_notes = Arc::new(Mutex::new(PlayingNotes::new(1024)));
    playing_notes.lock().unwrap().remember(0, 60).unwrap();
    let (port, dyn_port) = recording_port();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));

    control.play_flag.store(true, Ordering::SeqCst);
    let handle =
        spawn_dispatcher(Arc::clone(&control), store, Arc::clone(&playing_notes), dyn_port, clock);

    // beat 8 at default tempo = 4,000,000,000 ns
    let target_ns = 4_000_000_000u64;
    control.online_seek_target_ns.store(target_ns, Ordering::SeqCst);
    control.online_seek_flag.store(true, Ordering::SeqCst);

    std::thread::sleep(Duration::from_millis(5));
    control.play_flag.store(false, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    let sent = port.lock().unwrap().sent.clone();
    assert!(sent.iter().any(|p| p.bytes == vec![0x80, 60, 0]));
    assert!(playing_notes.lock().unwrap().is_empty());
    assert!(control.song_ns.load(Ordering::SeqCst) >= target_ns);
}

/// Scenario 6: sequence hotswap while playing. Publishing sequence B does
/// not interrupt output or panic the dispatcher; the old sequence is
/// retired through the reclamation queue without blocking playback.
#[test]
fn sequence_hotswap_does_not_interrupt_dispatcher() {
    let sequence_a = Sequence::new(vec![Event::new(0, 0x90, 60, 100)], vec![], TICKS_PER_BEAT, DEFAULT_USPQ);
    let sequence_b = Sequence::new(vec![Event::new(0, 0x90, 61, 100)], vec![], TICKS_PER_BEAT, DEFAULT_USPQ);

    let control = Arc::new(ControlState::new(TICKS_PER_BEAT));
    let (store, reclaimer) = SequenceStore::new(sequence_a, 32);
    let store = Arc::new(store);
    std::thread::spawn(move || reclaimer.run());
    let playing_notes = Arc::new(Mutex::new(PlayingNotes::new(1024)));
    let (port, dyn_port) = recording_port();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));

    control.play_flag.store(true, Ordering::SeqCst);
    let handle =
        spawn_dispatcher(Arc::clone(&control), Arc::clone(&store), playing_notes, dyn_port, clock);

    std::thread::sleep(Duration::from_millis(2));
    store.publish(sequence_b);
    std::thread::sleep(Duration::from_millis(3));

    control.play_flag.store(false, Ordering::SeqCst);
    handle.join().unwrap().unwrap();

    let sent = port.lock().unwrap().sent.clone();
    assert!(sent.iter().any(|p| p.bytes == vec![0x90, 60, 100]));
}
