//! Fixed-capacity registry of currently-sounding notes, so that stopping,
//! seeking, looping, or swapping sequences can emit matching note-offs
//! instead of leaving notes hanging. Mirrors the original `playingNotes`
//! array and its `rememberNote` / `forgetNote` / `killAllNotes` operations;
//! capacity is configured rather than compiled in.

use crate::error::FatalError;

/// A single (channel, note) pair currently sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Playing {
    channel: u8,
    note: u8,
}

/// Fixed-capacity table of currently-sounding notes. `remember` is fatal on
/// overflow: the design treats running out of slots as a capacity-invariant
/// violation, not a condition to silently drop.
#[derive(Debug)]
pub struct PlayingNotes {
    capacity: usize,
    slots: Vec<Playing>,
}

impl PlayingNotes {
    pub fn new(capacity: usize) -> Self {
        PlayingNotes { capacity, slots: Vec::with_capacity(capacity) }
    }

    /// Record a note-on. Fatal if the table is already at capacity.
    pub fn remember(&mut self, channel: u8, note: u8) -> Result<(), FatalError> {
        if self.slots.len() >= self.capacity {
            return Err(FatalError::PlayingNotesFull { capacity: self.capacity });
        }
        self.slots.push(Playing { channel, note });
        Ok(())
    }

    /// Record a note-off: remove the first matching (channel, note) entry,
    /// if present. Forgetting a note that isn't held is not an error — the
    /// original source tolerates unmatched note-offs (e.g. a sequence that
    /// never issued the corresponding note-on).
    pub fn forget(&mut self, channel: u8, note: u8) {
        if let Some(pos) = self.slots.iter().position(|p| p.channel == channel && p.note == note) {
            self.slots.swap_remove(pos);
        }
    }

    /// Drain every held note, returning `(channel, note)` pairs to emit as
    /// note-offs. Used on stop, seek, loop-wrap, and sequence hotswap.
    pub fn kill_all(&mut self) -> Vec<(u8, u8)> {
        self.slots.drain(..).map(|p| (p.channel, p.note)).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_then_forget_empties_table() {
        let mut table = PlayingNotes::new(4);
        table.remember(0, 60).unwrap();
        table.remember(0, 64).unwrap();
        assert_eq!(table.len(), 2);
        table.forget(0, 60);
        assert_eq!(table.len(), 1);
        table.forget(0, 64);
        assert!(table.is_empty());
    }

    #[test]
    fn forgetting_unheld_note_is_a_no_op() {
        let mut table = PlayingNotes::new(4);
        table.remember(0, 60).unwrap();
        table.forget(1, 99);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remember_beyond_capacity_is_fatal() {
        let mut table = PlayingNotes::new(2);
        table.remember(0, 1).unwrap();
        table.remember(0, 2).unwrap();
        let err = table.remember(0, 3).unwrap_err();
        assert_eq!(err, FatalError::PlayingNotesFull { capacity: 2 });
    }

    #[test]
    fn kill_all_drains_and_returns_every_held_note() {
        let mut table = PlayingNotes::new(4);
        table.remember(0, 60).unwrap();
        table.remember(1, 61).unwrap();
        let mut killed = table.kill_all();
        killed.sort();
        assert_eq!(killed, vec![(0, 60), (1, 61)]);
        assert!(table.is_empty());
    }
}
