//! The global tick source.
//!
//! All scheduling progress is measured in ticks of a single shared
//! [`GlobalClock`]. The tick counter is an atomic so readers never lock;
//! increments happen under the clock mutex so they pair with the condition
//! broadcast: a waiter that holds the mutex cannot miss a tick published
//! between its predicate check and its wait.
//!
//! The clock deliberately stays a passive hub: the thread that advances it
//! on a wall-clock interval lives in the scheduler, which also owns the
//! periodic memory snapshots keyed off tick counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

/// Wall-clock interval between ticks.
pub const TICK_INTERVAL_MS: u64 = 20;

/// Monotone tick counter with a broadcast wait point.
#[derive(Debug, Default)]
pub struct GlobalClock {
    ticks: AtomicU64,
    gate: Mutex<()>,
    advanced: Condvar,
}

impl GlobalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick value.
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Publish the next tick and wake every waiter. Returns the new value.
    pub fn advance(&self) -> u64 {
        let _gate = self.gate.lock().unwrap();
        let now = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        self.advanced.notify_all();
        now
    }

    /// Wake all waiters without advancing; used on shutdown so blocked
    /// workers re-check their cancellation predicate.
    pub fn interrupt(&self) {
        let _gate = self.gate.lock().unwrap();
        self.advanced.notify_all();
    }

    /// Block until the tick counter moves past `last_seen`, or until
    /// `cancelled` reports true.
    ///
    /// Returns `true` when the clock advanced, `false` on cancellation.
    /// Robust against spurious wake-ups: the predicate is re-checked on
    /// every wake.
    pub fn wait_past<F>(&self, last_seen: u64, cancelled: F) -> bool
    where
        F: Fn() -> bool,
    {
        let mut gate = self.gate.lock().unwrap();
        loop {
            if self.now() > last_seen {
                return true;
            }
            if cancelled() {
                return false;
            }
            gate = self.advanced.wait(gate).unwrap();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn advance_is_monotone() {
        let clock = GlobalClock::new();
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
        assert_eq!(clock.now(), 2);
    }

    #[test]
    fn wait_past_returns_immediately_when_already_past() {
        let clock = GlobalClock::new();
        clock.advance();
        assert!(clock.wait_past(0, || false));
    }

    #[test]
    fn wait_past_wakes_on_advance() {
        let clock = Arc::new(GlobalClock::new());
        let waiter = {
            let clock = Arc::clone(&clock);
            thread::spawn(move || clock.wait_past(0, || false))
        };
        thread::sleep(Duration::from_millis(20));
        clock.advance();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_past_honours_cancellation() {
        let clock = Arc::new(GlobalClock::new());
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let clock = Arc::clone(&clock);
            let stop = Arc::clone(&stop);
            thread::spawn(move || clock.wait_past(0, move || stop.load(Ordering::Acquire)))
        };
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        clock.interrupt();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn every_waiter_observes_the_same_tick() {
        let clock = Arc::new(GlobalClock::new());
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let clock = Arc::clone(&clock);
            waiters.push(thread::spawn(move || {
                clock.wait_past(0, || false);
                clock.now()
            }));
        }
        thread::sleep(Duration::from_millis(20));
        clock.advance();
        for w in waiters {
            assert_eq!(w.join().unwrap(), 1);
        }
    }
}
