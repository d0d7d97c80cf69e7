//! Outbound records for the storage and telemetry collaborators
//!
//! ## CSV row
//!
//! `Timestamp,ElapsedTime(ms),WheelRPM,CadenceRPM,AvgWheelRPM,AvgCadenceRPM,Chainring,Sprocket,GearRatio`
//!
//! RPM columns carry one decimal, the gear ratio two.
//!
//! ## Telemetry frame
//!
//! 20 bytes, little-endian, matching the receiver's C struct layout:
//!
//! | offset | size | field        |
//! |--------|------|--------------|
//! | 0      | 4    | wheel_rpm    (f32) |
//! | 4      | 4    | cadence_rpm  (f32) |
//! | 8      | 1    | chainring    (u8)  |
//! | 9      | 1    | sprocket     (u8)  |
//! | 10     | 2    | padding (zero) |
//! | 12     | 4    | gear_ratio   (f32) |
//! | 16     | 4    | timestamp    (u32, unix seconds) |

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineSnapshot;
use crate::gear::estimator::GearEstimate;
use crate::timing::Millis;

/// Size of an encoded [`TelemetryFrame`]
pub const TELEMETRY_FRAME_LEN: usize = 20;

/// Errors decoding a telemetry frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Telemetry frame must be {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// One row of the session log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// Wall-clock time of the record
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the session started
    pub elapsed_ms: Millis,
    pub wheel_rpm: f32,
    pub cadence_rpm: f32,
    pub session_avg_wheel_rpm: f32,
    pub session_avg_cadence_rpm: f32,
    pub chainring: u8,
    pub sprocket: u8,
    pub gear_ratio: f32,
}

impl LogRecord {
    /// Header line matching [`Self::to_csv_row`]
    pub const CSV_HEADER: &'static str = "Timestamp,ElapsedTime(ms),WheelRPM,CadenceRPM,AvgWheelRPM,AvgCadenceRPM,Chainring,Sprocket,GearRatio";

    /// Build a record from an engine snapshot
    pub fn from_snapshot(
        snapshot: &EngineSnapshot,
        timestamp: DateTime<Utc>,
        elapsed_ms: Millis,
    ) -> Self {
        Self {
            timestamp,
            elapsed_ms,
            wheel_rpm: snapshot.wheel_rpm,
            cadence_rpm: snapshot.cadence_rpm,
            session_avg_wheel_rpm: snapshot.session_avg_wheel_rpm,
            session_avg_cadence_rpm: snapshot.session_avg_cadence_rpm,
            chainring: snapshot.gear.chainring,
            sprocket: snapshot.gear.sprocket,
            gear_ratio: snapshot.gear.ratio,
        }
    }

    /// Format as one CSV line (no trailing newline)
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use gearsense_core::record::LogRecord;
    ///
    /// let record = LogRecord {
    ///     timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
    ///     elapsed_ms: 1500,
    ///     wheel_rpm: 100.0,
    ///     cadence_rpm: 50.0,
    ///     session_avg_wheel_rpm: 98.31,
    ///     session_avg_cadence_rpm: 49.0,
    ///     chainring: 1,
    ///     sprocket: 3,
    ///     gear_ratio: 2.0,
    /// };
    /// assert_eq!(
    ///     record.to_csv_row(),
    ///     "2024-05-01T08:30:00.000Z,1500,100.0,50.0,98.3,49.0,1,3,2.00"
    /// );
    /// ```
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{:.1},{:.1},{:.1},{:.1},{},{},{:.2}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.elapsed_ms,
            self.wheel_rpm,
            self.cadence_rpm,
            self.session_avg_wheel_rpm,
            self.session_avg_cadence_rpm,
            self.chainring,
            self.sprocket,
            self.gear_ratio,
        )
    }
}

/// Compact fixed-layout telemetry record, one per datagram
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryFrame {
    pub wheel_rpm: f32,
    pub cadence_rpm: f32,
    pub chainring: u8,
    pub sprocket: u8,
    pub gear_ratio: f32,
    /// Unix timestamp in seconds
    pub timestamp: u32,
}

impl TelemetryFrame {
    /// Build a frame from an engine snapshot
    pub fn from_snapshot(snapshot: &EngineSnapshot, timestamp: DateTime<Utc>) -> Self {
        Self {
            wheel_rpm: snapshot.wheel_rpm,
            cadence_rpm: snapshot.cadence_rpm,
            chainring: snapshot.gear.chainring,
            sprocket: snapshot.gear.sprocket,
            gear_ratio: snapshot.gear.ratio,
            timestamp: timestamp.timestamp().clamp(0, u32::MAX as i64) as u32,
        }
    }

    /// Gear fields as an estimate
    pub fn gear(&self) -> GearEstimate {
        GearEstimate {
            chainring: self.chainring,
            sprocket: self.sprocket,
            ratio: self.gear_ratio,
        }
    }

    /// Encode to the fixed wire layout
    pub fn encode(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        let mut buf = [0u8; TELEMETRY_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.wheel_rpm.to_le_bytes());
        buf[4..8].copy_from_slice(&self.cadence_rpm.to_le_bytes());
        buf[8] = self.chainring;
        buf[9] = self.sprocket;
        buf[12..16].copy_from_slice(&self.gear_ratio.to_le_bytes());
        buf[16..20].copy_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    /// Decode from the fixed wire layout
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let buf: &[u8; TELEMETRY_FRAME_LEN] =
            bytes.try_into().map_err(|_| FrameError::Length {
                expected: TELEMETRY_FRAME_LEN,
                actual: bytes.len(),
            })?;

        let word = |at: usize| [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]];
        Ok(Self {
            wheel_rpm: f32::from_le_bytes(word(0)),
            cadence_rpm: f32::from_le_bytes(word(4)),
            chainring: buf[8],
            sprocket: buf[9],
            gear_ratio: f32::from_le_bytes(word(12)),
            timestamp: u32::from_le_bytes(word(16)),
        })
    }
}
