//! The data model: `Event`, `TempoChange`, and the immutable `Sequence` they
//! form once `recompute_event_times` has annotated wall-time offsets.

use crate::time_map;

/// A single MIDI event at a musical position, annotated with its wall-time
/// offset from song-start once a sequence has gone through
/// [`recompute_event_times`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub tick: u32,
    pub at_ns: u64,
    pub status: u8,
    pub arg1: u8,
    pub arg2: u8,
}

impl Event {
    pub fn new(tick: u32, status: u8, arg1: u8, arg2: u8) -> Self {
        Event { tick, at_ns: 0, status, arg1, arg2 }
    }

    /// High nibble of the status byte: the MIDI message type.
    pub fn message_type(&self) -> u8 {
        self.status & 0xF0
    }

    /// Low nibble of the status byte: the MIDI channel, 0-15.
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// Wire size in bytes: program-change and channel-pressure are 2 bytes
    /// (status + arg1), everything else is 3.
    pub fn wire_len(&self) -> usize {
        match self.message_type() {
            0xC0 | 0xD0 => 2,
            _ => 3,
        }
    }

    /// A note-on with nonzero velocity: the playing-notes table should
    /// `remember` this (channel, note) pair.
    pub fn is_note_on(&self) -> bool {
        self.message_type() == 0x90 && self.arg2 > 0
    }

    /// A note-off, or a note-on with zero velocity (running-status idiom):
    /// the playing-notes table should `forget` this (channel, note) pair.
    pub fn is_note_off(&self) -> bool {
        self.message_type() == 0x80 || (self.message_type() == 0x90 && self.arg2 == 0)
    }
}

/// `(tick, atNs, uspq)` — a tempo change in effect from `tick` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u32,
    pub at_ns: u64,
    pub uspq: u32,
}

impl TempoChange {
    pub fn new(tick: u32, uspq: u32) -> Self {
        TempoChange { tick, at_ns: 0, uspq }
    }
}

/// An immutable, time-annotated sequence: events and tempo changes sorted by
/// tick ascending, with `at_ns` populated by [`recompute_event_times`]. Empty
/// sequences are legal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    pub events: Vec<Event>,
    pub tempo_changes: Vec<TempoChange>,
}

impl Sequence {
    /// Build a sequence from tick-sorted events and tempo changes, annotating
    /// every element's `at_ns` in a single linear pass.
    pub fn new(
        mut events: Vec<Event>,
        mut tempo_changes: Vec<TempoChange>,
        ticks_per_beat: u32,
        default_uspq: u32,
    ) -> Self {
        debug_assert!(
            events.windows(2).all(|w| w[0].tick <= w[1].tick),
            "events must be tick-ascending"
        );
        debug_assert!(
            tempo_changes.windows(2).all(|w| w[0].tick <= w[1].tick),
            "tempo changes must be tick-ascending"
        );
        time_map::recompute_event_times(&mut events, &mut tempo_changes, ticks_per_beat, default_uspq);
        Sequence { events, tempo_changes }
    }

    pub fn empty() -> Self {
        Sequence::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
