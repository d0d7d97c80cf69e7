//! Gearsense - bicycle wheel/cadence RPM and gear monitor
//!
//! This library re-exports the pulse-timing and gear-estimation engine from
//! `gearsense-core` and adds the host-side collaborators around it: JSON
//! configuration, session CSV storage, UDP telemetry, console commands, a
//! simulated sensor source, and the tokio monitoring loop.

pub mod commands;
pub mod config;
pub mod monitor;
pub mod simulator;
pub mod storage;
pub mod telemetry;

pub use gearsense_core::engine;
pub use gearsense_core::gear;
pub use gearsense_core::pulse;
pub use gearsense_core::record;
pub use gearsense_core::session;
pub use gearsense_core::timing;

pub use gearsense_core::{
    AutoSession, EngineSnapshot, GearEstimate, GearTable, LogRecord, ManualClock, Millis,
    RpmEngine, SessionTracker, SystemClock, TelemetryFrame, TriggerInput,
};
pub use gearsense_core::{BUILD_DATE, VERSION};
