//! Polling-side RPM computation for one sensor channel
//!
//! A [`PulseTracker`] reads the interrupt-side [`TriggerInput`] state on
//! every measurement tick, turns the latest accepted inter-trigger interval
//! into an instantaneous RPM, and keeps two averaging horizons:
//!
//! - **interval**: readings since the last report tick (default 3 s)
//! - **session**: readings rolled up since the session started
//!
//! Debounce happens in the trigger handler (milliseconds); timeout
//! detection happens here (seconds). The two filters are independent.

use serde::{Deserialize, Serialize};

use super::activity::LastActivity;
use super::trigger::{TriggerInput, TriggerSnapshot};
use crate::timing::{elapsed, Millis, MAX_TIME_BETWEEN_TRIGGERS_MS, TIMEOUT_PERIOD_MS};

/// Maximum plausible wheel RPM
pub const MAX_WHEEL_RPM: f32 = 1000.0;

/// Maximum plausible crank cadence RPM
pub const MAX_CADENCE_RPM: f32 = 200.0;

/// Sensor channel identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Rear wheel sensor
    Wheel,
    /// Crank (cadence) sensor
    Cadence,
}

impl Channel {
    /// Readings above this are rejected as implausible
    pub fn max_rpm(self) -> f32 {
        match self {
            Channel::Wheel => MAX_WHEEL_RPM,
            Channel::Cadence => MAX_CADENCE_RPM,
        }
    }

    /// Lowercase channel name for logs
    pub fn name(self) -> &'static str {
        match self {
            Channel::Wheel => "wheel",
            Channel::Cadence => "cadence",
        }
    }
}

/// Result of taking an interval snapshot with [`PulseTracker::take_interval`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalSummary {
    /// Average of the readings in the interval (0 if none)
    pub average_rpm: f32,
    /// Number of accepted readings in the interval
    pub readings: u32,
}

/// RPM tracker for one channel
#[derive(Debug)]
pub struct PulseTracker {
    /// Which sensor this tracker serves
    channel: Channel,
    /// Interrupt-side timing shared with the trigger source
    input: TriggerInput,
    /// Magnets passing the sensor per revolution (at least 1)
    magnets_per_revolution: u8,
    /// Readings above this are discarded as implausible
    max_rpm: f32,
    /// RPM from the most recent accepted interval
    instant_rpm: f32,
    /// Sum of accepted readings in the current reporting interval
    interval_total_rpm: f32,
    /// Accepted readings in the current reporting interval
    interval_reading_count: u32,
    /// Sum of readings rolled into the current session
    session_total_rpm: f32,
    /// Readings rolled into the current session
    session_reading_count: u32,
    /// Session average, recomputed on every roll-up
    session_avg_rpm: f32,
    /// Consecutive measurement ticks with an accepted reading
    reading_streak: u32,
}

impl PulseTracker {
    /// Create a tracker for `channel` sharing the given activity stamp
    pub fn new(channel: Channel, magnets_per_revolution: u8, activity: LastActivity) -> Self {
        Self {
            channel,
            input: TriggerInput::new(activity),
            magnets_per_revolution: magnets_per_revolution.max(1),
            max_rpm: channel.max_rpm(),
            instant_rpm: 0.0,
            interval_total_rpm: 0.0,
            interval_reading_count: 0,
            session_total_rpm: 0.0,
            session_reading_count: 0,
            session_avg_rpm: 0.0,
            reading_streak: 0,
        }
    }

    /// Handle for the trigger source of this channel
    pub fn input(&self) -> TriggerInput {
        self.input.clone()
    }

    /// Record a trigger directly (same as going through [`Self::input`])
    #[inline]
    pub fn record_trigger(&self, now: Millis) -> bool {
        self.input.record_trigger(now)
    }

    /// Change the magnet count. Zero is treated as one.
    pub fn set_magnets(&mut self, magnets_per_revolution: u8) {
        if magnets_per_revolution == 0 {
            tracing::warn!(channel = self.channel.name(), "Magnet count 0 treated as 1");
        }
        self.magnets_per_revolution = magnets_per_revolution.max(1);
    }

    /// Compute the instantaneous RPM from the latest accepted interval.
    ///
    /// Returns the accepted reading, or `None` when the interval is missing,
    /// stale, or yields an implausible RPM. A rejected reading leaves
    /// `instant_rpm` untouched; only [`Self::check_timeout`] zeroes it.
    pub fn compute_rpm(&mut self) -> Option<f32> {
        let TriggerSnapshot {
            time_between_triggers: interval,
            ..
        } = self.input.snapshot();

        let reading = if interval > 0 && interval < MAX_TIME_BETWEEN_TRIGGERS_MS {
            let rpm = (60.0 * 1000.0) / (interval as f32 * self.magnets_per_revolution as f32);
            (rpm <= self.max_rpm).then_some(rpm)
        } else {
            None
        };

        match reading {
            Some(rpm) => {
                self.instant_rpm = rpm;
                self.interval_total_rpm += rpm;
                self.interval_reading_count += 1;
                self.reading_streak = self.reading_streak.saturating_add(1);
            }
            None => {
                if interval > 0 && interval < MAX_TIME_BETWEEN_TRIGGERS_MS {
                    tracing::debug!(
                        channel = self.channel.name(),
                        interval_ms = interval,
                        "Rejected implausible RPM reading"
                    );
                }
                self.reading_streak = 0;
            }
        }
        reading
    }

    /// Zero the RPM if the channel has been silent for longer than
    /// [`TIMEOUT_PERIOD_MS`], and re-arm it so the check fires only once.
    ///
    /// Returns `true` if a timeout was applied.
    pub fn check_timeout(&mut self, now: Millis) -> bool {
        let Some(last) = self.input.snapshot().last_trigger else {
            return false;
        };
        if elapsed(now, last) <= TIMEOUT_PERIOD_MS {
            return false;
        }
        // A trigger that raced in after the snapshot keeps the channel alive
        if !self.input.disarm_if_unchanged(last) {
            return false;
        }

        tracing::debug!(
            channel = self.channel.name(),
            silent_ms = elapsed(now, last),
            "Signal timeout"
        );
        self.instant_rpm = 0.0;
        self.reading_streak = 0;
        true
    }

    /// Average of the current interval's readings, or 0 with none
    pub fn current_average_rpm(&self) -> f32 {
        if self.interval_reading_count > 0 {
            self.interval_total_rpm / self.interval_reading_count as f32
        } else {
            0.0
        }
    }

    /// Add the interval accumulators into the session accumulators.
    ///
    /// Does not clear the interval; calling this twice without a
    /// [`Self::reset_interval_accumulators`] in between counts the same
    /// interval twice.
    pub fn roll_into_session(&mut self) {
        self.session_total_rpm += self.interval_total_rpm;
        self.session_reading_count += self.interval_reading_count;
        self.session_avg_rpm = if self.session_reading_count > 0 {
            self.session_total_rpm / self.session_reading_count as f32
        } else {
            0.0
        };
    }

    /// Zero the interval accumulators
    pub fn reset_interval_accumulators(&mut self) {
        self.interval_total_rpm = 0.0;
        self.interval_reading_count = 0;
    }

    /// Snapshot the interval, roll it into the session and reset it
    pub fn take_interval(&mut self) -> IntervalSummary {
        let summary = IntervalSummary {
            average_rpm: self.current_average_rpm(),
            readings: self.interval_reading_count,
        };
        self.roll_into_session();
        self.reset_interval_accumulators();
        summary
    }

    /// Zero the session accumulators. Instant and interval state are kept.
    pub fn start_session(&mut self) {
        self.session_total_rpm = 0.0;
        self.session_reading_count = 0;
        self.session_avg_rpm = 0.0;
    }

    /// Zero every dynamic field, including the interrupt-side state.
    /// Configuration (channel, magnets) is kept.
    pub fn reset(&mut self) {
        self.input.clear();
        self.instant_rpm = 0.0;
        self.reset_interval_accumulators();
        self.start_session();
        self.reading_streak = 0;
    }

    /// Channel this tracker serves
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Magnets per revolution used in the RPM formula
    pub fn magnets_per_revolution(&self) -> u8 {
        self.magnets_per_revolution
    }

    /// RPM from the most recent accepted interval (0 after a timeout)
    pub fn instant_rpm(&self) -> f32 {
        self.instant_rpm
    }

    /// Accepted triggers since the last reset
    pub fn pulse_count(&self) -> u32 {
        self.input.pulse_count()
    }

    /// Time of the last accepted trigger, `None` while unarmed
    pub fn last_trigger_time(&self) -> Option<Millis> {
        self.input.snapshot().last_trigger
    }

    /// Most recent accepted inter-trigger interval
    pub fn time_between_triggers(&self) -> Millis {
        self.input.snapshot().time_between_triggers
    }

    /// Sum of readings in the current reporting interval
    pub fn interval_total_rpm(&self) -> f32 {
        self.interval_total_rpm
    }

    /// Readings in the current reporting interval
    pub fn interval_reading_count(&self) -> u32 {
        self.interval_reading_count
    }

    /// Sum of readings rolled into the session
    pub fn session_total_rpm(&self) -> f32 {
        self.session_total_rpm
    }

    /// Readings rolled into the session
    pub fn session_reading_count(&self) -> u32 {
        self.session_reading_count
    }

    /// Session average RPM
    pub fn session_avg_rpm(&self) -> f32 {
        self.session_avg_rpm
    }

    /// Consecutive measurement ticks that produced an accepted reading
    pub fn reading_streak(&self) -> u32 {
        self.reading_streak
    }
}
