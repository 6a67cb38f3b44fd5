//! Time source boundary.
//!
//! TTL checks, day-bucket boundaries, reconnection backoff, and pending-patch
//! expiry all read the clock through [`TimeSource`], never directly, so tests
//! can drive them deterministically with [`ManualClock`].

use crate::types::Timestamp;
use std::cell::Cell;

///
/// TimeSource
///

pub trait TimeSource {
    /// Current wall-clock timestamp in seconds.
    fn now(&self) -> Timestamp;
}

///
/// SystemClock
/// Default wall-clock source backed by chrono.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    #[allow(clippy::cast_sign_loss)]
    fn now(&self) -> Timestamp {
        let secs = chrono::Utc::now().timestamp();

        Timestamp::from_seconds(if secs < 0 { 0 } else { secs as u64 })
    }
}

///
/// ManualClock
/// Deterministic clock advanced by hand.
///

#[derive(Debug, Default)]
pub struct ManualClock {
    secs: Cell<u64>,
}

impl ManualClock {
    #[must_use]
    pub const fn starting_at(secs: u64) -> Self {
        Self {
            secs: Cell::new(secs),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.set(secs);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.set(self.secs.get().saturating_add(secs));
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_seconds(self.secs.get())
    }
}
