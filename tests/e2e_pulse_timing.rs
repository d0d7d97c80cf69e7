//! E2E tests for trigger debounce, RPM computation and signal timeout
//!
//! Drives the engine through its public trigger handles and measurement
//! tick, the same way the monitoring loop and the sensor inputs do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use gearsense::pulse::activity::LastActivity;
use gearsense::pulse::tracker::{Channel, PulseTracker};
use gearsense::timing::TIMEOUT_PERIOD_MS;
use gearsense::{Millis, RpmEngine};

fn engine(wheel_magnets: u8, crank_magnets: u8) -> RpmEngine {
    let mut engine = RpmEngine::new(0);
    engine.begin(wheel_magnets, crank_magnets, 0);
    engine
}

/// Triggers one second apart give 60 RPM with one magnet
#[test]
fn test_one_hertz_is_sixty_rpm() {
    let mut engine = engine(1, 1);
    let wheel = engine.wheel_input();
    for t in [0, 1000, 2000] {
        assert!(wheel.record_trigger(t));
    }

    let outcome = engine.measurement_tick(2000);
    assert_relative_eq!(outcome.wheel_reading.unwrap(), 60.0, epsilon = 1e-4);
    assert_relative_eq!(engine.wheel().instant_rpm(), 60.0, epsilon = 1e-4);
}

/// 600 ms spacing follows the formula: 60000 / 600 = 100 RPM
#[test]
fn test_six_hundred_ms_spacing() {
    let mut engine = engine(1, 1);
    let wheel = engine.wheel_input();
    for t in [0, 600, 1200] {
        wheel.record_trigger(t);
    }
    engine.measurement_tick(1200);
    assert_relative_eq!(engine.wheel().instant_rpm(), 100.0, epsilon = 1e-4);
}

/// rpm = 60000 / (dt * magnets) across a range of intervals and magnet counts
#[test]
fn test_rpm_formula() {
    for magnets in [1u8, 2, 4] {
        for dt in [150u32, 333, 750, 1200, 5000] {
            let mut tracker = PulseTracker::new(Channel::Wheel, magnets, LastActivity::new(0));
            tracker.record_trigger(10_000);
            tracker.record_trigger(10_000 + dt);

            let expected = 60_000.0 / (dt as f32 * magnets as f32);
            let reading = tracker.compute_rpm();
            assert!(
                reading.is_some(),
                "dt={} magnets={} should be accepted",
                dt,
                magnets
            );
            assert_relative_eq!(reading.unwrap(), expected, max_relative = 1e-5);
        }
    }
}

/// A bounce inside the debounce window is dropped and counted once
#[test]
fn test_debounce_counts_once() {
    let engine = engine(1, 1);
    let cadence = engine.cadence_input();

    assert!(cadence.record_trigger(1000));
    assert!(cadence.record_trigger(2000));
    assert!(!cadence.record_trigger(2005), "bounce should be rejected");
    assert!(!cadence.record_trigger(2009), "bounce should be rejected");
    assert_eq!(cadence.pulse_count(), 2);
    assert_eq!(cadence.snapshot().time_between_triggers, 1000);

    // Exactly at the threshold is accepted
    assert!(cadence.record_trigger(2010));
    assert_eq!(cadence.pulse_count(), 3);
}

/// Cadence above 200 RPM is implausible; the last good value stays
#[test]
fn test_implausible_cadence_is_dropped() {
    let mut engine = engine(1, 1);
    let cadence = engine.cadence_input();
    cadence.record_trigger(0);
    cadence.record_trigger(1000);
    engine.measurement_tick(1000);
    assert_relative_eq!(engine.cadence().instant_rpm(), 60.0, epsilon = 1e-4);

    // 250 ms => 240 RPM
    cadence.record_trigger(1250);
    let outcome = engine.measurement_tick(1250);
    assert_eq!(outcome.cadence_reading, None);
    assert_relative_eq!(engine.cadence().instant_rpm(), 60.0, epsilon = 1e-4);
    assert_eq!(engine.cadence().interval_reading_count(), 1);
}

/// Silence longer than the timeout zeroes RPM until riding resumes
#[test]
fn test_timeout_then_recovery() {
    let mut engine = engine(1, 1);
    let wheel = engine.wheel_input();
    for t in (0..=3000).step_by(500) {
        wheel.record_trigger(t);
    }
    engine.measurement_tick(3000);
    assert_relative_eq!(engine.wheel().instant_rpm(), 120.0, epsilon = 1e-4);

    // Exactly at the limit: not yet timed out
    assert!(!engine.measurement_tick(3000 + TIMEOUT_PERIOD_MS).wheel_timed_out);
    let outcome = engine.measurement_tick(3001 + TIMEOUT_PERIOD_MS);
    assert!(outcome.wheel_timed_out);
    assert_eq!(engine.wheel().instant_rpm(), 0.0);

    // Stays zero, and the timeout fires only once
    let later = engine.measurement_tick(20_000);
    assert!(!later.wheel_timed_out);
    assert_eq!(engine.wheel().instant_rpm(), 0.0);

    // First trigger after the timeout only re-arms
    wheel.record_trigger(30_000);
    assert_eq!(engine.measurement_tick(30_000).wheel_reading, None);
    assert_eq!(engine.wheel().instant_rpm(), 0.0);

    wheel.record_trigger(30_400);
    let outcome = engine.measurement_tick(30_400);
    assert_relative_eq!(outcome.wheel_reading.unwrap(), 150.0, epsilon = 1e-4);
}

/// The millisecond counter wrapping around does not disturb intervals
#[test]
fn test_clock_wraparound() {
    let start: Millis = u32::MAX - 300;
    let mut engine = RpmEngine::new(start);
    engine.begin(1, 1, start);
    let wheel = engine.wheel_input();

    wheel.record_trigger(start);
    wheel.record_trigger(start.wrapping_add(500));
    let now = start.wrapping_add(500);
    engine.measurement_tick(now);
    assert_relative_eq!(engine.wheel().instant_rpm(), 120.0, epsilon = 1e-4);
    assert!(!engine.measurement_tick(now.wrapping_add(1000)).wheel_timed_out);
    assert_eq!(engine.idle_for(now.wrapping_add(1000)), 1000);
}

/// Two magnets halve the RPM for the same pulse spacing
#[test]
fn test_magnet_count_scales_rpm() {
    let mut engine = engine(2, 1);
    let wheel = engine.wheel_input();
    wheel.record_trigger(0);
    wheel.record_trigger(500);
    engine.measurement_tick(500);
    assert_relative_eq!(engine.wheel().instant_rpm(), 60.0, epsilon = 1e-4);
}

/// Triggers from another thread are never lost to the polling side
#[test]
fn test_concurrent_triggers_and_ticks() {
    let mut engine = engine(1, 1);
    let wheel = engine.wheel_input();
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let wheel = wheel.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut accepted = 0u32;
            for i in 0..2000u32 {
                if wheel.record_trigger(i * 20) {
                    accepted += 1;
                }
            }
            done.store(true, Ordering::SeqCst);
            accepted
        })
    };

    while !done.load(Ordering::SeqCst) {
        let now = wheel.snapshot().last_trigger.unwrap_or(0);
        engine.measurement_tick(now);
    }
    let accepted = producer.join().unwrap();

    assert_eq!(accepted, 2000);
    assert_eq!(engine.wheel().pulse_count(), 2000);
}
