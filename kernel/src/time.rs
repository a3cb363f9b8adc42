// SPDX-License-Identifier: MPL-2.0

//! Clocks used for cache expiry and log timestamps.
//!
//! Cache entries record their expiry as whole seconds of uptime. A stored
//! expiry of zero means the entry never expires.

use core::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::prelude::*;

/// A trait that can abstract clocks which have the ability to read time.
pub trait Clock: Send + Sync {
    /// Read the current time of this clock.
    fn read_time(&self) -> Duration;

    /// Returns the current uptime in whole seconds.
    fn uptime_secs(&self) -> u64 {
        self.read_time().as_secs()
    }
}

/// A monotonic clock counting from its creation.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn read_time(&self) -> Duration {
        self.start.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(delta.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn set(&self, now: Duration) {
        self.nanos.store(now.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn read_time(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

/// Converts a time-to-live in seconds into an absolute expiry.
///
/// A TTL of zero produces a persistent entry.
pub(crate) fn expiry_after(now_secs: u64, ttl_secs: u32) -> u64 {
    if ttl_secs == 0 {
        0
    } else {
        now_secs + ttl_secs as u64
    }
}

pub(crate) fn is_expired(expiry: u64, now_secs: u64) -> bool {
    expiry != 0 && expiry <= now_secs
}
