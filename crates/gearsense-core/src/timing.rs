//! Millisecond time base shared by the trigger handlers and the polling loop
//!
//! Timestamps are `u32` milliseconds from an arbitrary epoch that wrap after
//! ~49 days, the same as a microcontroller millisecond counter. Every delta
//! in this crate is taken with [`elapsed`] so wrap-around is harmless.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Millisecond timestamp (wrapping)
pub type Millis = u32;

/// Minimum time between accepted triggers (debounce)
pub const MIN_TRIGGER_INTERVAL_MS: Millis = 10;

/// Inter-trigger intervals at or above this are stale, not a reading
pub const MAX_TIME_BETWEEN_TRIGGERS_MS: Millis = 60_000;

/// Silence on a channel longer than this zeroes its RPM
pub const TIMEOUT_PERIOD_MS: Millis = 3_000;

/// Sustained-reading time required before readings count as stabilized
pub const STABILIZATION_PERIOD_MS: Millis = 2_000;

/// Period of RPM computation and timeout checks
pub const MEASUREMENT_INTERVAL_MS: Millis = 1_000;

/// Period of interval roll-up into session averages
pub const OUTPUT_INTERVAL_MS: Millis = 3_000;

/// Period of storage and telemetry records while a session is active
pub const LOGGING_INTERVAL_MS: Millis = 1_000;

/// Wrapping difference `now - earlier`
#[inline]
pub fn elapsed(now: Millis, earlier: Millis) -> Millis {
    now.wrapping_sub(earlier)
}

/// Source of millisecond timestamps
///
/// Implementations must be monotonically non-decreasing (modulo wrap).
pub trait Clock: Send + Sync {
    /// Current timestamp
    fn now_ms(&self) -> Millis;
}

/// Monotonic wall-independent clock anchored at construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock reading 0 now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        // Truncation to u32 is the intended wrap
        self.origin.elapsed().as_millis() as Millis
    }
}

/// Manually advanced clock for simulation and tests
///
/// Clones share the same time value.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Create a clock starting at `start`
    pub fn new(start: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start)),
        }
    }

    /// Set the current time
    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::Release);
    }

    /// Advance by `delta` and return the new time
    pub fn advance(&self, delta: Millis) -> Millis {
        self.now
            .fetch_add(delta, Ordering::AcqRel)
            .wrapping_add(delta)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_wraps() {
        assert_eq!(elapsed(5, u32::MAX - 4), 10);
        assert_eq!(elapsed(1500, 1000), 500);
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        assert_eq!(clock.advance(50), 150);
        assert_eq!(other.now_ms(), 150);
        other.set(1000);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
