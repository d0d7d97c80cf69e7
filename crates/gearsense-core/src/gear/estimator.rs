//! Nearest-ratio gear estimation
//!
//! During steady pedaling, wheel RPM divided by cadence RPM approximates the
//! chainring/sprocket tooth ratio. The estimator scans every combination in
//! the [`GearTable`] and publishes the closest one when it is within
//! [`GEAR_CONFIDENCE`] relative error of the measurement.

use serde::{Deserialize, Serialize};

use super::table::{GearTable, GearTableError};

/// Both RPMs must reach this before a ratio is computed
pub const MIN_GEAR_RPM: f32 = 10.0;

/// Maximum relative error between measured and theoretical ratio
pub const GEAR_CONFIDENCE: f32 = 0.2;

/// Published gear estimate. All-zero means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GearEstimate {
    /// 1-based chainring index (0 = unknown)
    pub chainring: u8,
    /// 1-based sprocket index (0 = unknown)
    pub sprocket: u8,
    /// Theoretical ratio of the matched combination (0 = unknown)
    pub ratio: f32,
}

impl GearEstimate {
    /// The "no gear" estimate
    pub const UNKNOWN: GearEstimate = GearEstimate {
        chainring: 0,
        sprocket: 0,
        ratio: 0.0,
    };

    pub fn is_known(&self) -> bool {
        self.chainring != 0 && self.sprocket != 0
    }
}

/// Closest combination for a measured ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GearMatch {
    /// 0-based chainring index
    pub chainring_index: usize,
    /// 0-based sprocket index
    pub sprocket_index: usize,
    /// Theoretical ratio of the combination
    pub ratio: f32,
    /// Absolute difference to the measured ratio
    pub difference: f32,
}

impl GearMatch {
    /// Relative error against the measured ratio
    pub fn relative_error(&self, measured: f32) -> f32 {
        self.difference / measured
    }

    fn to_estimate(self) -> GearEstimate {
        GearEstimate {
            chainring: (self.chainring_index + 1) as u8,
            sprocket: (self.sprocket_index + 1) as u8,
            ratio: self.ratio,
        }
    }
}

/// What to publish when the closest match misses the confidence gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidencePolicy {
    /// Keep the last published estimate (hysteresis)
    #[default]
    HoldPrevious,
    /// Fall back to unknown
    Clear,
}

/// Find the combination whose ratio is closest to `measured`.
///
/// Ties go to the first combination in iteration order (lowest chainring
/// index, then lowest sprocket index).
pub fn closest_gear(table: &GearTable, measured: f32) -> Option<GearMatch> {
    let mut best: Option<GearMatch> = None;
    for (c, &front) in table.chainrings().iter().enumerate() {
        for (s, &rear) in table.sprockets().iter().enumerate() {
            let ratio = front as f32 / rear as f32;
            let difference = (ratio - measured).abs();
            if best.is_none_or(|b| difference < b.difference) {
                best = Some(GearMatch {
                    chainring_index: c,
                    sprocket_index: s,
                    ratio,
                    difference,
                });
            }
        }
    }
    best
}

/// Gear estimator holding the configured table and the published estimate
#[derive(Debug, Clone)]
pub struct GearEstimator {
    table: Option<GearTable>,
    current: GearEstimate,
    policy: LowConfidencePolicy,
}

impl GearEstimator {
    /// Create an estimator with no table configured
    pub fn new() -> Self {
        Self {
            table: None,
            current: GearEstimate::UNKNOWN,
            policy: LowConfidencePolicy::default(),
        }
    }

    /// Create an estimator with a table already installed
    pub fn with_table(table: GearTable) -> Self {
        Self {
            table: Some(table),
            ..Self::new()
        }
    }

    /// Install a new gear table.
    ///
    /// On error the previous table stays in place and the estimate is kept.
    /// On success the estimate resets to unknown.
    pub fn configure(&mut self, chainrings: &[u8], sprockets: &[u8]) -> Result<(), GearTableError> {
        match GearTable::new(chainrings, sprockets) {
            Ok(table) => {
                self.set_table(table);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Gear table rejected, keeping previous configuration");
                Err(e)
            }
        }
    }

    /// Install an already validated table
    pub fn set_table(&mut self, table: GearTable) {
        tracing::info!(
            chainrings = ?table.chainrings(),
            sprockets = ?table.sprockets(),
            "Gear table configured"
        );
        self.table = Some(table);
        self.current = GearEstimate::UNKNOWN;
    }

    /// Set the low-confidence policy
    pub fn set_policy(&mut self, policy: LowConfidencePolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> LowConfidencePolicy {
        self.policy
    }

    /// Estimate the gear from simultaneous wheel and cadence readings
    ///
    /// # Example
    /// ```
    /// use gearsense_core::gear::estimator::GearEstimator;
    /// use gearsense_core::gear::table::GearTable;
    ///
    /// let table = GearTable::new(&[50, 34], &[25, 17]).unwrap();
    /// let mut estimator = GearEstimator::with_table(table);
    /// let gear = estimator.estimate(100.0, 50.0);
    /// assert_eq!((gear.chainring, gear.sprocket), (1, 1));
    /// assert_eq!(gear.ratio, 2.0);
    /// ```
    pub fn estimate(&mut self, wheel_rpm: f32, cadence_rpm: f32) -> GearEstimate {
        let Some(table) = self.table.as_ref() else {
            self.current = GearEstimate::UNKNOWN;
            return self.current;
        };
        if wheel_rpm < MIN_GEAR_RPM || cadence_rpm < MIN_GEAR_RPM {
            self.current = GearEstimate::UNKNOWN;
            return self.current;
        }

        let measured = wheel_rpm / cadence_rpm;
        match closest_gear(table, measured) {
            Some(best) if best.relative_error(measured) < GEAR_CONFIDENCE => {
                self.current = best.to_estimate();
            }
            best => {
                tracing::trace!(
                    measured,
                    closest = ?best.map(|b| b.ratio),
                    policy = ?self.policy,
                    "Low-confidence gear match"
                );
                if self.policy == LowConfidencePolicy::Clear {
                    self.current = GearEstimate::UNKNOWN;
                }
            }
        }
        self.current
    }

    /// Force the estimate to unknown
    pub fn clear(&mut self) {
        self.current = GearEstimate::UNKNOWN;
    }

    /// Last published estimate
    pub fn current(&self) -> GearEstimate {
        self.current
    }

    /// Configured table, if any
    pub fn table(&self) -> Option<&GearTable> {
        self.table.as_ref()
    }

    /// Human-readable gear, e.g. `50/25 (2.0:1)`
    pub fn description(&self) -> String {
        let teeth = self.table.as_ref().and_then(|t| {
            Some((
                t.chainring_teeth(self.current.chainring)?,
                t.sprocket_teeth(self.current.sprocket)?,
            ))
        });
        match teeth {
            Some((front, rear)) => format!("{}/{} ({:.1}:1)", front, rear, self.current.ratio),
            None => "Unknown Gear".to_string(),
        }
    }
}

impl Default for GearEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimator(chainrings: &[u8], sprockets: &[u8]) -> GearEstimator {
        GearEstimator::with_table(GearTable::new(chainrings, sprockets).unwrap())
    }

    #[test]
    fn test_exact_match() {
        let mut est = estimator(&[50, 34], &[11, 25, 28]);
        let gear = est.estimate(100.0, 50.0);
        assert_eq!(gear.chainring, 1);
        assert_eq!(gear.sprocket, 2);
        assert_relative_eq!(gear.ratio, 2.0);
    }

    #[test]
    fn test_exact_match_is_strictly_closest() {
        let table = GearTable::new(&[50, 34], &[11, 12, 13, 15, 16, 19, 21, 24, 25]).unwrap();
        let best = closest_gear(&table, 2.0).unwrap();
        assert_eq!((best.chainring_index, best.sprocket_index), (0, 8));
        assert_eq!(best.difference, 0.0);

        for &front in table.chainrings() {
            for &rear in table.sprockets() {
                if (front, rear) != (50, 25) {
                    assert!((front as f32 / rear as f32 - 2.0).abs() > 0.0);
                }
            }
        }
    }

    #[test]
    fn test_below_floor_is_unknown() {
        let mut est = estimator(&[50], &[25]);
        est.estimate(100.0, 50.0);
        assert!(est.current().is_known());

        assert_eq!(est.estimate(100.0, 5.0), GearEstimate::UNKNOWN);
        est.estimate(100.0, 50.0);
        assert_eq!(est.estimate(9.9, 50.0), GearEstimate::UNKNOWN);
    }

    #[test]
    fn test_no_table_is_unknown() {
        let mut est = GearEstimator::new();
        assert_eq!(est.estimate(100.0, 50.0), GearEstimate::UNKNOWN);
        assert_eq!(est.description(), "Unknown Gear");
    }

    #[test]
    fn test_tie_breaks_to_first_pair() {
        // 40/20 and 50/25 are both exactly 2.0
        let table = GearTable::new(&[40, 50], &[20, 25]).unwrap();
        let best = closest_gear(&table, 2.0).unwrap();
        assert_eq!((best.chainring_index, best.sprocket_index), (0, 0));
    }

    #[test]
    fn test_low_confidence_holds_previous() {
        let mut est = estimator(&[50], &[25]);
        let first = est.estimate(100.0, 50.0);
        assert!(first.is_known());

        // Measured 5.0 vs only available 2.0 => 60% error
        let held = est.estimate(250.0, 50.0);
        assert_eq!(held, first);
    }

    #[test]
    fn test_low_confidence_from_unknown_stays_unknown() {
        let mut est = estimator(&[50], &[25]);
        assert_eq!(est.estimate(250.0, 50.0), GearEstimate::UNKNOWN);
    }

    #[test]
    fn test_low_confidence_clear_policy() {
        let mut est = estimator(&[50], &[25]);
        est.set_policy(LowConfidencePolicy::Clear);
        est.estimate(100.0, 50.0);
        assert_eq!(est.estimate(250.0, 50.0), GearEstimate::UNKNOWN);
    }

    #[test]
    fn test_confidence_boundary() {
        let mut est = estimator(&[50], &[25]);
        // Measured 2.4: |2.0 - 2.4| / 2.4 = 0.1667 < 0.2
        assert!(est.estimate(120.0, 50.0).is_known());
        est.clear();
        // Measured 2.6: 0.6 / 2.6 = 0.23
        assert!(!est.estimate(130.0, 50.0).is_known());
    }

    #[test]
    fn test_rejected_configure_keeps_table() {
        let mut est = estimator(&[50], &[25]);
        est.estimate(100.0, 50.0);
        let before = est.current();

        assert!(est.configure(&[53, 39, 30, 22], &[11]).is_err());
        assert_eq!(est.table().unwrap().chainrings(), &[50]);
        assert_eq!(est.current(), before);
        assert_eq!(est.estimate(100.0, 50.0), before);
    }

    #[test]
    fn test_configure_resets_estimate() {
        let mut est = estimator(&[50], &[25]);
        est.estimate(100.0, 50.0);
        est.configure(&[34], &[17]).unwrap();
        assert_eq!(est.current(), GearEstimate::UNKNOWN);
    }

    #[test]
    fn test_description() {
        let mut est = estimator(&[50, 34], &[25]);
        est.estimate(100.0, 50.0);
        assert_eq!(est.description(), "50/25 (2.0:1)");
        est.clear();
        assert_eq!(est.description(), "Unknown Gear");
    }
}
