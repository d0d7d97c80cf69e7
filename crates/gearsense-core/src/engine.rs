//! RPM and gear engine
//!
//! Owns both channel trackers, the shared activity stamp, the stabilization
//! gate and the gear estimator, and exposes the tick entry points the
//! polling loop drives:
//!
//! - [`RpmEngine::measurement_tick`] every `MEASUREMENT_INTERVAL_MS`
//! - [`RpmEngine::report_tick`] every `OUTPUT_INTERVAL_MS`
//!
//! Trigger sources never touch the engine itself; they hold the
//! [`TriggerInput`] handles returned by [`RpmEngine::wheel_input`] and
//! [`RpmEngine::cadence_input`].

use serde::Serialize;

use crate::gear::estimator::{GearEstimate, GearEstimator, LowConfidencePolicy};
use crate::gear::table::{GearTable, GearTableError};
use crate::pulse::activity::{has_activity, LastActivity, StabilizationGate};
use crate::pulse::tracker::{Channel, IntervalSummary, PulseTracker};
use crate::pulse::trigger::TriggerInput;
use crate::timing::Millis;

/// What happened during one measurement tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Accepted wheel reading, if any
    pub wheel_reading: Option<f32>,
    /// Accepted cadence reading, if any
    pub cadence_reading: Option<f32>,
    /// Wheel channel timed out on this tick
    pub wheel_timed_out: bool,
    /// Cadence channel timed out on this tick
    pub cadence_timed_out: bool,
    /// Gear estimate after this tick
    pub gear: GearEstimate,
    /// Stabilization gate state after this tick
    pub stabilized: bool,
}

/// Interval averages taken by [`RpmEngine::report_tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalReport {
    /// Wheel interval that was rolled up
    pub wheel: IntervalSummary,
    /// Cadence interval that was rolled up
    pub cadence: IntervalSummary,
    /// Session average wheel RPM after the roll-up
    pub session_avg_wheel_rpm: f32,
    /// Session average cadence RPM after the roll-up
    pub session_avg_cadence_rpm: f32,
}

/// Read-only view of the engine for storage and telemetry collaborators
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EngineSnapshot {
    /// Instant wheel RPM
    pub wheel_rpm: f32,
    /// Instant cadence RPM
    pub cadence_rpm: f32,
    /// Wheel average over the current reporting interval
    pub interval_avg_wheel_rpm: f32,
    /// Cadence average over the current reporting interval
    pub interval_avg_cadence_rpm: f32,
    /// Wheel average over the current session
    pub session_avg_wheel_rpm: f32,
    /// Cadence average over the current session
    pub session_avg_cadence_rpm: f32,
    /// Published gear estimate
    pub gear: GearEstimate,
    /// Accepted wheel triggers since reset
    pub wheel_pulses: u32,
    /// Accepted cadence triggers since reset
    pub cadence_pulses: u32,
    /// Timestamp of the most recent accepted trigger
    pub last_activity: Millis,
    /// Either channel reports a non-zero RPM
    pub active: bool,
    /// Stabilization gate latched
    pub stabilized: bool,
}

/// Pulse-timing and gear-estimation engine for one wheel and one crank sensor
#[derive(Debug)]
pub struct RpmEngine {
    /// Wheel speed channel
    wheel: PulseTracker,
    /// Crank cadence channel
    cadence: PulseTracker,
    /// Stamp shared by both channels' trigger handlers
    activity: LastActivity,
    /// Latches once both channels read steadily
    gate: StabilizationGate,
    /// Gear table and published estimate
    gears: GearEstimator,
}

impl RpmEngine {
    /// Create an engine with one magnet per channel and no gear table.
    /// Call [`Self::begin`] before use.
    pub fn new(now: Millis) -> Self {
        let activity = LastActivity::new(now);
        Self {
            wheel: PulseTracker::new(Channel::Wheel, 1, activity.clone()),
            cadence: PulseTracker::new(Channel::Cadence, 1, activity.clone()),
            activity,
            gate: StabilizationGate::new(),
            gears: GearEstimator::new(),
        }
    }

    /// Configure magnet counts, reset all state, and install the default
    /// compact road gear table.
    pub fn begin(&mut self, wheel_magnets: u8, crank_magnets: u8, now: Millis) {
        self.wheel.set_magnets(wheel_magnets);
        self.cadence.set_magnets(crank_magnets);
        self.reset(now);
        self.gears.set_table(GearTable::compact_road());
        tracing::info!(
            wheel_magnets = self.wheel.magnets_per_revolution(),
            crank_magnets = self.cadence.magnets_per_revolution(),
            "RPM engine started"
        );
    }

    /// Replace the gear table. A rejected table leaves the previous one active.
    pub fn configure_gears(
        &mut self,
        chainrings: &[u8],
        sprockets: &[u8],
    ) -> Result<(), GearTableError> {
        self.gears.configure(chainrings, sprockets)
    }

    /// Choose what happens to the estimate on a low-confidence match
    pub fn set_gear_policy(&mut self, policy: LowConfidencePolicy) {
        self.gears.set_policy(policy);
    }

    /// Trigger handle for the wheel sensor
    pub fn wheel_input(&self) -> TriggerInput {
        self.wheel.input()
    }

    /// Trigger handle for the crank sensor
    pub fn cadence_input(&self) -> TriggerInput {
        self.cadence.input()
    }

    /// Periodic measurement: compute RPMs, check timeouts, estimate the gear,
    /// and evaluate the stabilization gate.
    pub fn measurement_tick(&mut self, now: Millis) -> TickOutcome {
        let wheel_reading = self.wheel.compute_rpm();
        let cadence_reading = self.cadence.compute_rpm();

        let wheel_timed_out = self.wheel.check_timeout(now);
        let cadence_timed_out = self.cadence.check_timeout(now);

        let gear = self
            .gears
            .estimate(self.wheel.instant_rpm(), self.cadence.instant_rpm());

        let stabilized = self.evaluate_stabilization(now);

        TickOutcome {
            wheel_reading,
            cadence_reading,
            wheel_timed_out,
            cadence_timed_out,
            gear,
            stabilized,
        }
    }

    /// Periodic report: snapshot the interval averages, roll them into the
    /// session and reset the interval accumulators in one step.
    pub fn report_tick(&mut self) -> IntervalReport {
        let wheel = self.wheel.take_interval();
        let cadence = self.cadence.take_interval();
        IntervalReport {
            wheel,
            cadence,
            session_avg_wheel_rpm: self.wheel.session_avg_rpm(),
            session_avg_cadence_rpm: self.cadence.session_avg_rpm(),
        }
    }

    /// Begin a new session: zero session averages and unlatch stabilization
    pub fn start_session(&mut self, now: Millis) {
        self.wheel.start_session();
        self.cadence.start_session();
        self.gate.reset();
        self.activity.reseed(now);
    }

    /// Clear all dynamic state. Magnets and the gear table are kept.
    pub fn reset(&mut self, now: Millis) {
        self.wheel.reset();
        self.cadence.reset();
        self.gate.reset();
        self.gears.clear();
        self.activity.reseed(now);
    }

    /// True if either channel currently reports a non-zero RPM
    pub fn has_activity(&self) -> bool {
        has_activity(self.wheel.instant_rpm(), self.cadence.instant_rpm())
    }

    /// Evaluate and return the stabilization gate at `now`
    pub fn is_stabilized(&mut self, now: Millis) -> bool {
        self.evaluate_stabilization(now)
    }

    fn evaluate_stabilization(&mut self, now: Millis) -> bool {
        self.gate.evaluate(
            now,
            self.wheel.reading_streak(),
            self.cadence.reading_streak(),
        )
    }

    /// Latched stabilization state, without evaluating
    pub fn stabilized(&self) -> bool {
        self.gate.is_stabilized()
    }

    /// Timestamp of the most recent accepted trigger on either channel
    pub fn last_activity(&self) -> Millis {
        self.activity.get()
    }

    /// Milliseconds since the most recent accepted trigger
    pub fn idle_for(&self, now: Millis) -> Millis {
        self.activity.idle_for(now)
    }

    /// Wheel tracker
    pub fn wheel(&self) -> &PulseTracker {
        &self.wheel
    }

    /// Cadence tracker
    pub fn cadence(&self) -> &PulseTracker {
        &self.cadence
    }

    /// Mutable wheel tracker, for callers driving the two-step roll-up
    pub fn wheel_mut(&mut self) -> &mut PulseTracker {
        &mut self.wheel
    }

    /// Mutable cadence tracker, for callers driving the two-step roll-up
    pub fn cadence_mut(&mut self) -> &mut PulseTracker {
        &mut self.cadence
    }

    /// Current gear estimate
    pub fn gear(&self) -> GearEstimate {
        self.gears.current()
    }

    /// Human-readable current gear
    pub fn gear_description(&self) -> String {
        self.gears.description()
    }

    /// Configured gear table
    pub fn gear_table(&self) -> Option<&GearTable> {
        self.gears.table()
    }

    /// Copy of every value the collaborators read
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            wheel_rpm: self.wheel.instant_rpm(),
            cadence_rpm: self.cadence.instant_rpm(),
            interval_avg_wheel_rpm: self.wheel.current_average_rpm(),
            interval_avg_cadence_rpm: self.cadence.current_average_rpm(),
            session_avg_wheel_rpm: self.wheel.session_avg_rpm(),
            session_avg_cadence_rpm: self.cadence.session_avg_rpm(),
            gear: self.gears.current(),
            wheel_pulses: self.wheel.pulse_count(),
            cadence_pulses: self.cadence.pulse_count(),
            last_activity: self.activity.get(),
            active: self.has_activity(),
            stabilized: self.gate.is_stabilized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn started() -> RpmEngine {
        let mut engine = RpmEngine::new(0);
        engine.begin(1, 1, 0);
        engine
    }

    /// Fire wheel and cadence at fixed periods from `from` to `to`, ticking
    /// the engine every second.
    fn ride(engine: &mut RpmEngine, from: Millis, to: Millis, wheel_ms: Millis, cadence_ms: Millis) {
        let wheel = engine.wheel_input();
        let cadence = engine.cadence_input();
        for t in from..=to {
            if t % wheel_ms == 0 {
                wheel.record_trigger(t);
            }
            if t % cadence_ms == 0 {
                cadence.record_trigger(t);
            }
            if t % 1000 == 0 && t > from {
                engine.measurement_tick(t);
            }
        }
    }

    #[test]
    fn test_begin_installs_default_table() {
        let engine = started();
        assert_eq!(engine.gear_table().unwrap(), &GearTable::compact_road());
        assert_eq!(engine.gear(), GearEstimate::UNKNOWN);
        assert!(!engine.has_activity());
    }

    #[test]
    fn test_measurement_estimates_gear() {
        let mut engine = started();
        engine.configure_gears(&[50, 34], &[25, 17]).unwrap();
        // Wheel 100 RPM (600ms), cadence 50 RPM (1200ms)
        ride(&mut engine, 0, 6000, 600, 1200);

        assert_relative_eq!(engine.wheel().instant_rpm(), 100.0, epsilon = 0.01);
        assert_relative_eq!(engine.cadence().instant_rpm(), 50.0, epsilon = 0.01);
        let gear = engine.gear();
        assert_eq!((gear.chainring, gear.sprocket), (1, 1));
        assert_relative_eq!(gear.ratio, 2.0);
        assert_eq!(engine.gear_description(), "50/25 (2.0:1)");
    }

    #[test]
    fn test_timeout_clears_gear() {
        let mut engine = started();
        engine.configure_gears(&[50], &[25]).unwrap();
        ride(&mut engine, 0, 6000, 600, 1200);
        assert!(engine.gear().is_known());

        // Cadence stops, wheel keeps spinning
        let wheel = engine.wheel_input();
        let mut timed_out = false;
        for t in 6001..=12_000u32 {
            if t % 600 == 0 {
                wheel.record_trigger(t);
            }
            if t % 1000 == 0 {
                timed_out |= engine.measurement_tick(t).cadence_timed_out;
            }
        }
        assert!(timed_out);
        assert_eq!(engine.cadence().instant_rpm(), 0.0);
        assert_eq!(engine.gear(), GearEstimate::UNKNOWN);
        assert!(engine.has_activity());
    }

    #[test]
    fn test_report_tick_rolls_and_resets() {
        let mut engine = started();
        ride(&mut engine, 0, 3000, 500, 1000);
        let report = engine.report_tick();
        assert!(report.wheel.readings > 0);
        assert_relative_eq!(report.wheel.average_rpm, 120.0, epsilon = 0.01);
        assert_relative_eq!(report.session_avg_wheel_rpm, 120.0, epsilon = 0.01);
        assert_eq!(engine.wheel().interval_reading_count(), 0);
        assert_eq!(engine.cadence().interval_reading_count(), 0);
    }

    #[test]
    fn test_stabilization_latches_and_survives_gap() {
        let mut engine = started();
        ride(&mut engine, 0, 8000, 500, 1000);
        assert!(engine.stabilized());

        // Long silence: timeouts fire but the gate stays latched
        for t in (9000..=20_000).step_by(1000) {
            engine.measurement_tick(t);
        }
        assert!(!engine.has_activity());
        assert!(engine.is_stabilized(20_000));
    }

    #[test]
    fn test_stabilization_requires_both_channels() {
        let mut engine = started();
        let wheel = engine.wheel_input();
        for t in 0..=20_000u32 {
            if t % 500 == 0 {
                wheel.record_trigger(t);
            }
            if t % 1000 == 0 {
                engine.measurement_tick(t);
            }
        }
        assert!(!engine.is_stabilized(20_000));
    }

    #[test]
    fn test_start_session_unlatches() {
        let mut engine = started();
        ride(&mut engine, 0, 8000, 500, 1000);
        engine.report_tick();
        assert!(engine.stabilized());

        engine.start_session(8000);
        assert!(!engine.stabilized());
        assert_eq!(engine.wheel().session_reading_count(), 0);
        assert_eq!(engine.last_activity(), 8000);
        // Instant values survive a session start
        assert!(engine.has_activity());
    }

    #[test]
    fn test_reset_clears_everything_but_config() {
        let mut engine = started();
        engine.configure_gears(&[50], &[25]).unwrap();
        ride(&mut engine, 0, 6000, 600, 1200);
        engine.reset(7000);

        let snap = engine.snapshot();
        assert_eq!(snap.wheel_rpm, 0.0);
        assert_eq!(snap.wheel_pulses, 0);
        assert_eq!(snap.gear, GearEstimate::UNKNOWN);
        assert_eq!(snap.last_activity, 7000);
        assert!(!snap.stabilized);
        assert_eq!(engine.gear_table().unwrap().chainrings(), &[50]);
        assert_eq!(engine.wheel().magnets_per_revolution(), 1);
    }

    #[test]
    fn test_rejected_gear_config_keeps_estimating() {
        let mut engine = started();
        engine.configure_gears(&[50], &[25]).unwrap();
        let err = engine.configure_gears(&[53, 39, 30, 22], &[11]);
        assert!(err.is_err());
        ride(&mut engine, 0, 6000, 600, 1200);
        assert_eq!(engine.gear().chainring, 1);
        assert_eq!(engine.gear().sprocket, 1);
    }

    #[test]
    fn test_snapshot_reflects_trackers() {
        let mut engine = started();
        ride(&mut engine, 0, 3000, 500, 1000);
        let snap = engine.snapshot();
        assert_relative_eq!(snap.wheel_rpm, engine.wheel().instant_rpm());
        assert_relative_eq!(snap.interval_avg_wheel_rpm, engine.wheel().current_average_rpm());
        assert_eq!(snap.wheel_pulses, engine.wheel().pulse_count());
        assert!(snap.active);
    }
}
