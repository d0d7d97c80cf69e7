//! Activity tracking and the stabilization gate
//!
//! Both channels share one [`LastActivity`] stamp, written by whichever
//! trigger handler accepted a pulse most recently. The [`StabilizationGate`]
//! lives on the polling side and decides when readings are trustworthy
//! enough to act on (e.g. to auto-start a session).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::timing::{elapsed, Millis, STABILIZATION_PERIOD_MS};

/// Consecutive accepted readings each channel needs before the
/// stabilization timer may run
pub const STABLE_READINGS: u32 = 3;

/// Timestamp of the most recent accepted trigger on either channel
#[derive(Debug, Clone)]
pub struct LastActivity(Arc<AtomicU32>);

impl LastActivity {
    /// Create a stamp seeded with `now`
    pub fn new(now: Millis) -> Self {
        Self(Arc::new(AtomicU32::new(now)))
    }

    /// Advance the stamp to `now` from a trigger handler.
    ///
    /// Only moves forward (wrap-aware): a handler that read the clock
    /// earlier but stores later cannot pull the stamp back in time.
    #[inline]
    pub(crate) fn mark(&self, now: Millis) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let ahead = elapsed(now, current);
                (ahead != 0 && ahead < u32::MAX / 2).then_some(now)
            });
    }

    /// Set the stamp unconditionally (engine reset, session start)
    pub(crate) fn reseed(&self, now: Millis) {
        self.0.store(now, Ordering::Release);
    }

    /// Last activity timestamp
    pub fn get(&self) -> Millis {
        self.0.load(Ordering::Acquire)
    }

    /// Milliseconds since the last activity
    pub fn idle_for(&self, now: Millis) -> Millis {
        elapsed(now, self.get())
    }
}

/// True if either channel currently reports motion
pub fn has_activity(wheel_rpm: f32, cadence_rpm: f32) -> bool {
    wheel_rpm > 0.0 || cadence_rpm > 0.0
}

/// Latching confidence gate over sustained readings on both channels
///
/// Once latched it stays latched until [`StabilizationGate::reset`].
#[derive(Debug, Clone, Default)]
pub struct StabilizationGate {
    stabilized: bool,
    first_valid_reading: Option<Millis>,
}

impl StabilizationGate {
    /// Create an unlatched gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the gate at `now` given each channel's run of consecutive
    /// accepted readings.
    ///
    /// Any evaluation where either run is below [`STABLE_READINGS`] restarts
    /// the timer. The gate latches once the precondition has held for more
    /// than [`STABILIZATION_PERIOD_MS`].
    pub fn evaluate(&mut self, now: Millis, wheel_streak: u32, cadence_streak: u32) -> bool {
        if self.stabilized {
            return true;
        }

        if wheel_streak >= STABLE_READINGS && cadence_streak >= STABLE_READINGS {
            match self.first_valid_reading {
                None => self.first_valid_reading = Some(now),
                Some(first) if elapsed(now, first) > STABILIZATION_PERIOD_MS => {
                    self.stabilized = true;
                    tracing::info!(
                        since = first,
                        at = now,
                        "Readings stabilized on both channels"
                    );
                }
                Some(_) => {}
            }
        } else {
            self.first_valid_reading = None;
        }

        self.stabilized
    }

    /// Latched state, without evaluating
    pub fn is_stabilized(&self) -> bool {
        self.stabilized
    }

    /// Anchor of the running stabilization timer
    pub fn first_valid_reading(&self) -> Option<Millis> {
        self.first_valid_reading
    }

    /// Unlatch and clear the timer
    pub fn reset(&mut self) {
        self.stabilized = false;
        self.first_valid_reading = None;
    }
}
