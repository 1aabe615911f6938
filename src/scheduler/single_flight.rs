//! # Single-Flight Guard
//!
//! Process-wide flag ensuring at most one full-tree refresh runs at a time.
//! Holding the flag is tied to a [`FlightGuard`] value: dropping the guard
//! clears the flag, whether the walk finished, failed, panicked or was
//! cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the flag if nobody holds it
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                flight: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of holding the flag; releases it on drop
#[derive(Debug)]
pub struct FlightGuard {
    flight: Arc<SingleFlight>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.running.store(false, Ordering::Release);
    }
}
