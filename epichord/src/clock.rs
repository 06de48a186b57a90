//! Wall-clock abstraction so the dispatcher's frame loop can be driven by a
//! deterministic fake in tests instead of `std::time::Instant`, in the style
//! of `imbolc-audio`'s backend-trait split between a real implementation and
//! a recording double.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A source of monotonic nanosecond timestamps and a way to sleep until one.
pub trait Clock: Send {
    /// Nanoseconds since an arbitrary but fixed epoch for this clock instance.
    fn now_ns(&self) -> u64;

    /// Block the calling thread until `deadline_ns` (same epoch as `now_ns`).
    /// A no-op if the deadline has already passed.
    fn sleep_until(&self, deadline_ns: u64);
}

/// Production clock: wraps a fixed `Instant` origin.
pub struct RealClock {
    origin: Instant,
}

impl RealClock {
    pub fn new() -> Self {
        RealClock { origin: Instant::now() }
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn sleep_until(&self, deadline_ns: u64) {
        let now = self.now_ns();
        if deadline_ns > now {
            std::thread::sleep(std::time::Duration::from_nanos(deadline_ns - now));
        }
    }
}

/// Deterministic test clock: `now_ns` is an atomic the test advances by
/// calling [`FakeClock::advance`]; `sleep_until` simply jumps time forward to
/// the deadline rather than blocking the thread, so frame-loop tests run
/// instantly.
pub struct FakeClock {
    now_ns: AtomicU64,
}

impl FakeClock {
    pub fn new(start_ns: u64) -> Self {
        FakeClock { now_ns: AtomicU64::new(start_ns) }
    }

    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn sleep_until(&self, deadline_ns: u64) {
        let now = self.now_ns();
        if deadline_ns > now {
            self.now_ns.store(deadline_ns, Ordering::SeqCst);
        }
    }
}
