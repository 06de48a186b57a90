//! Live sequence replacement without stopping playback: a single-writer,
//! single-reader handle plus an offline reclaimer, replacing the original's
//! atomic-pointer-exchange-and-garbage-queue design. The control thread
//! publishes a new `Arc<Sequence>` by swapping the current-sequence cell; the
//! dispatcher snapshots the current one once per frame and, on noticing its
//! held snapshot has been superseded, hands its own stale `Arc` off to the
//! reclaimer's bounded channel rather than dropping it in place, so freeing a
//! sequence's heap storage never happens on the dispatcher's thread.
//! Grounded in the general "control publishes, audio thread snapshots"
//! discipline of `imbolc-audio::triple_buffer`, rendered here as `Arc` +
//! `Mutex` + a bounded `crossbeam_channel` queue since the design calls for
//! an explicit reclamation queue rather than slot-swapping.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::FatalError;
use crate::sequence::Sequence;

/// Published current sequence plus the channel used to hand off retired
/// copies to the [`Reclaimer`].
pub struct SequenceStore {
    current: Mutex<Arc<Sequence>>,
    retire_tx: Sender<Arc<Sequence>>,
}

impl SequenceStore {
    /// Build a store already holding `initial`, with a reclamation queue of
    /// the given bounded capacity.
    pub fn new(initial: Sequence, reclaim_queue_capacity: usize) -> (Self, Reclaimer) {
        let (tx, rx) = crossbeam_channel::bounded(reclaim_queue_capacity);
        let store = SequenceStore { current: Mutex::new(Arc::new(initial)), retire_tx: tx };
        let reclaimer = Reclaimer { rx };
        (store, reclaimer)
    }

    /// Publish a new sequence by swapping the current-sequence cell. Does not
    /// itself retire the superseded `Arc`: whoever is still holding a clone
    /// of it (the dispatcher, via its own snapshot) is responsible for
    /// retiring it through [`SequenceStore::retire`] once it notices the
    /// change, so the control thread dropping its own local copy here is the
    /// only drop this call performs.
    pub fn publish(&self, new_sequence: Sequence) {
        let mut slot = self.current.lock().expect("sequence store mutex poisoned");
        *slot = Arc::new(new_sequence);
    }

    /// Hand a superseded sequence off to the reclaimer thread instead of
    /// letting it drop in place. Fatal if the queue is already full: the
    /// reclaimer thread isn't keeping up, which the design treats as a
    /// capacity-invariant violation rather than something to paper over by
    /// blocking the caller.
    pub fn retire(&self, sequence: Arc<Sequence>) -> Result<(), FatalError> {
        match self.retire_tx.try_send(sequence) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(FatalError::ReclaimQueueFull { capacity: self.retire_tx.capacity().unwrap_or(0) })
            }
            Err(TrySendError::Disconnected(_)) => {
                // The reclaimer thread is gone; nothing left to coordinate
                // with, but the caller no longer holds this Arc either way.
                Ok(())
            }
        }
    }

    /// Snapshot the current sequence: a cheap `Arc` clone, taken once per
    /// dispatch frame.
    pub fn snapshot(&self) -> Arc<Sequence> {
        Arc::clone(&self.current.lock().expect("sequence store mutex poisoned"))
    }
}

/// Dedicated thread that blocks on the retirement queue and drops whatever
/// arrives, so that freeing a superseded sequence's heap storage never
/// happens on the dispatcher's thread.
pub struct Reclaimer {
    rx: Receiver<Arc<Sequence>>,
}

impl Reclaimer {
    /// Run until the store (and every snapshot) is dropped and the channel
    /// disconnects. Intended to be spawned on its own thread.
    pub fn run(self) {
        while let Ok(retired) = self.rx.recv() {
            drop(retired);
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("epichord-reclaimer".to_string())
            .spawn(move || self.run())
            .expect("failed to spawn reclaimer thread")
    }
}
