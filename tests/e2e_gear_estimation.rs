//! E2E tests for gear estimation
//!
//! Feeds steady wheel/crank pulse trains into the engine and checks the
//! published gear against the configured chainring/sprocket table.

use approx::assert_relative_eq;
use gearsense::gear::estimator::{closest_gear, GearEstimator, LowConfidencePolicy};
use gearsense::gear::table::{GearTableError, DEFAULT_SPROCKETS};
use gearsense::{GearEstimate, GearTable, Millis, RpmEngine};

fn engine() -> RpmEngine {
    let mut engine = RpmEngine::new(0);
    engine.begin(1, 1, 0);
    engine
}

/// Pedal with fixed pulse periods, ticking every second
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
        if t % 1000 == 0 {
            engine.measurement_tick(t);
        }
    }
}

/// wheel 100 / cadence 50 picks the exact 50/25 pair
#[test]
fn test_exact_ratio_pair() {
    let mut engine = engine();
    engine
        .configure_gears(&[50, 34], &[11, 12, 13, 14, 16, 18, 21, 24, 25])
        .unwrap();
    ride(&mut engine, 0, 6000, 600, 1200);

    let gear = engine.gear();
    assert_eq!(gear.chainring, 1, "50T chainring is index 1");
    assert_eq!(gear.sprocket, 9, "25T sprocket is index 9");
    assert_relative_eq!(gear.ratio, 2.0);
    assert_eq!(engine.gear_description(), "50/25 (2.0:1)");

    let best = closest_gear(engine.gear_table().unwrap(), 2.0).unwrap();
    assert_eq!(best.difference, 0.0, "no other pair can be closer");
}

/// The default compact table recognizes a small-ring climbing gear
#[test]
fn test_default_table_small_ring() {
    let mut engine = engine();
    // 34/28 = 1.214; cadence 70 RPM => wheel ~85 RPM
    // Periods: cadence 857 ms, wheel 706 ms => measured 1.2139
    ride(&mut engine, 0, 10_000, 706, 857);

    let gear = engine.gear();
    assert_eq!(gear.chainring, 2);
    assert_eq!(gear.sprocket as usize, DEFAULT_SPROCKETS.len());
    assert_relative_eq!(gear.ratio, 34.0 / 28.0);
}

/// Coasting (no crank input) leaves the gear unknown
#[test]
fn test_coasting_is_unknown() {
    let mut engine = engine();
    let wheel = engine.wheel_input();
    for t in (0..=5000).step_by(300) {
        wheel.record_trigger(t);
    }
    engine.measurement_tick(5000);
    assert!(engine.wheel().instant_rpm() > 0.0);
    assert_eq!(engine.gear(), GearEstimate::UNKNOWN);
    assert_eq!(engine.gear_description(), "Unknown Gear");
}

/// Cadence under the 10 RPM floor forces unknown
#[test]
fn test_slow_cadence_is_unknown() {
    let mut estimator = GearEstimator::with_table(GearTable::default());
    assert!(estimator.estimate(100.0, 50.0).is_known());
    assert_eq!(estimator.estimate(100.0, 5.0), GearEstimate::UNKNOWN);
    assert_eq!(estimator.description(), "Unknown Gear");
}

/// A table over capacity is rejected and the old one keeps working
#[test]
fn test_oversized_table_keeps_previous() {
    let mut engine = engine();
    engine.configure_gears(&[50], &[25]).unwrap();

    let err = engine
        .configure_gears(&[53, 39, 30, 22], &[11, 12])
        .unwrap_err();
    assert_eq!(err, GearTableError::TooManyChainrings { count: 4, max: 3 });

    let sprockets: Vec<u8> = (10..23).collect();
    assert!(matches!(
        engine.configure_gears(&[50], &sprockets),
        Err(GearTableError::TooManySprockets { count: 13, max: 12 })
    ));

    ride(&mut engine, 0, 6000, 600, 1200);
    assert_eq!(engine.gear_table().unwrap().chainrings(), &[50]);
    assert_eq!((engine.gear().chainring, engine.gear().sprocket), (1, 1));
}

/// Shifting to a far-off ratio holds the last gear by default
#[test]
fn test_low_confidence_policies() {
    for (policy, expect_known) in [
        (LowConfidencePolicy::HoldPrevious, true),
        (LowConfidencePolicy::Clear, false),
    ] {
        let mut engine = engine();
        engine.configure_gears(&[50], &[25]).unwrap();
        engine.set_gear_policy(policy);
        ride(&mut engine, 0, 6000, 600, 1200);
        assert!(engine.gear().is_known());

        // Ratio 4.0 vs the only gear 2.0 => 50% error
        ride(&mut engine, 6001, 12_000, 300, 1200);
        assert_relative_eq!(engine.wheel().instant_rpm(), 200.0, epsilon = 0.01);
        assert_eq!(
            engine.gear().is_known(),
            expect_known,
            "policy {:?} gave {:?}",
            policy,
            engine.gear()
        );
    }
}

/// The gear follows a shift once the new ratio settles
#[test]
fn test_shift_is_tracked() {
    let mut engine = engine();
    engine.configure_gears(&[50, 34], &[17, 25]).unwrap();

    // 50/25 = 2.0
    ride(&mut engine, 0, 6000, 600, 1200);
    assert_eq!((engine.gear().chainring, engine.gear().sprocket), (1, 2));

    // 50/17 = 2.94: cadence 1200 ms (50 RPM), wheel 408 ms (147 RPM)
    ride(&mut engine, 6001, 14_000, 408, 1200);
    assert_eq!((engine.gear().chainring, engine.gear().sprocket), (1, 1));
}
