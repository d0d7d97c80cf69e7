//! Gearsense Core - Pulse timing, RPM tracking, and gear estimation
//!
//! This library converts raw wheel and crank sensor triggers into debounced
//! instantaneous RPM values, detects signal loss, keeps interval and session
//! averages, and infers the most likely gear from a chainring/sprocket table.
//! Storage, telemetry and command handling live outside this crate; it only
//! produces the records they consume.

pub mod engine;
pub mod gear;
pub mod pulse;
pub mod record;
pub mod session;
pub mod timing;

pub use engine::{EngineSnapshot, IntervalReport, RpmEngine, TickOutcome};
pub use gear::estimator::{GearEstimate, GearEstimator, LowConfidencePolicy};
pub use gear::table::{GearSpec, GearTable, GearTableError};
pub use pulse::tracker::{Channel, PulseTracker};
pub use pulse::trigger::TriggerInput;
pub use record::{LogRecord, TelemetryFrame};
pub use session::{AutoSession, SessionTracker};
pub use timing::{Clock, ManualClock, Millis, SystemClock};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (YYYY-MM-DD), set by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default magnets on the wheel
pub const DEFAULT_WHEEL_MAGNETS: u8 = 1;

/// Default magnets on the crank
pub const DEFAULT_CRANK_MAGNETS: u8 = 1;
