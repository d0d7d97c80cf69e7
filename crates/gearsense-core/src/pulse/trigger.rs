//! Interrupt-side trigger recording
//!
//! A [`TriggerInput`] is the only thing a sensor interrupt (or a simulated
//! trigger thread) touches. Recording a trigger is a single compare-and-swap
//! on one packed word plus two independent single-word atomics: no locks,
//! no allocation, no logging.
//!
//! ## Synchronization contract
//!
//! - `last_trigger`, `time_between_triggers` and the armed flag live in one
//!   `AtomicU64`, so the polling side always reads them as a consistent set.
//! - `pulse_count` and the shared last-activity stamp are single-word
//!   atomics and may be read independently. The activity stamp only moves
//!   forward, so interleaved handlers on the two channels keep the newest.
//! - The polling side only ever disarms a channel, and only by
//!   compare-and-swap against a word it has observed, so a trigger that
//!   lands concurrently wins and is never lost.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::activity::LastActivity;
use crate::timing::{elapsed, Millis, MIN_TRIGGER_INTERVAL_MS};

const ARMED_BIT: u64 = 1 << 63;
const INTERVAL_SHIFT: u32 = 32;
const INTERVAL_MASK: u64 = 0xFFFF;

/// Consistent view of a channel's interrupt-side timing fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerSnapshot {
    /// Last accepted trigger, `None` when the channel is unarmed
    pub last_trigger: Option<Millis>,
    /// Delta between the last two accepted triggers (0 = none yet).
    /// Saturates at `u16::MAX`, which is already far beyond any usable interval.
    pub time_between_triggers: Millis,
}

impl TriggerSnapshot {
    fn unpack(word: u64) -> Self {
        if word & ARMED_BIT == 0 {
            return Self::default();
        }
        Self {
            last_trigger: Some(word as u32),
            time_between_triggers: ((word >> INTERVAL_SHIFT) & INTERVAL_MASK) as Millis,
        }
    }

    fn pack(last_trigger: Millis, time_between: Millis) -> u64 {
        let interval = time_between.min(INTERVAL_MASK as u32) as u64;
        ARMED_BIT | (interval << INTERVAL_SHIFT) | last_trigger as u64
    }
}

#[derive(Debug)]
struct TriggerCell {
    timing: AtomicU64,
    pulse_count: AtomicU32,
    activity: LastActivity,
}

/// Cloneable handle for recording triggers on one channel
#[derive(Debug, Clone)]
pub struct TriggerInput {
    cell: Arc<TriggerCell>,
}

impl TriggerInput {
    pub(crate) fn new(activity: LastActivity) -> Self {
        Self {
            cell: Arc::new(TriggerCell {
                timing: AtomicU64::new(0),
                pulse_count: AtomicU32::new(0),
                activity,
            }),
        }
    }

    /// Record a sensor trigger at `now`
    ///
    /// Returns `true` if the trigger was accepted. A trigger closer than
    /// [`MIN_TRIGGER_INTERVAL_MS`] to the last accepted one is discarded and
    /// leaves every field untouched. An unarmed channel accepts the trigger
    /// without a debounce check and records no interval.
    #[inline]
    pub fn record_trigger(&self, now: Millis) -> bool {
        let cell = &*self.cell;
        let updated = cell
            .timing
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                match TriggerSnapshot::unpack(word).last_trigger {
                    None => Some(TriggerSnapshot::pack(now, 0)),
                    Some(last) => {
                        let delta = elapsed(now, last);
                        if delta < MIN_TRIGGER_INTERVAL_MS {
                            None
                        } else {
                            Some(TriggerSnapshot::pack(now, delta))
                        }
                    }
                }
            });

        if updated.is_err() {
            return false;
        }
        cell.pulse_count.fetch_add(1, Ordering::Relaxed);
        cell.activity.mark(now);
        true
    }

    /// Accepted triggers since the last reset
    pub fn pulse_count(&self) -> u32 {
        self.cell.pulse_count.load(Ordering::Relaxed)
    }

    /// Consistent view of the timing fields
    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot::unpack(self.cell.timing.load(Ordering::Acquire))
    }

    /// Disarm the channel if its last trigger is still `expected_last`.
    ///
    /// Returns `false` when a newer trigger arrived in the meantime.
    pub(crate) fn disarm_if_unchanged(&self, expected_last: Millis) -> bool {
        let timing = &self.cell.timing;
        let current = timing.load(Ordering::Acquire);
        if TriggerSnapshot::unpack(current).last_trigger != Some(expected_last) {
            return false;
        }
        timing
            .compare_exchange(current, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Disarm unconditionally and zero the pulse counter
    pub(crate) fn clear(&self) {
        self.cell.timing.store(0, Ordering::Release);
        self.cell.pulse_count.store(0, Ordering::Relaxed);
    }
}
