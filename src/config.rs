//! Persistent application configuration
//!
//! Stores sensor setup, gear table, loop intervals, output targets and the
//! simulated ride in a JSON file at `<config_dir>/gearsense/config.json`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use gearsense_core::gear::table::{GearSpec, GearTable, GearTableError};
use gearsense_core::timing::{LOGGING_INTERVAL_MS, MEASUREMENT_INTERVAL_MS, OUTPUT_INTERVAL_MS};
use gearsense_core::{AutoSession, LowConfidencePolicy, Millis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulator::RideProfile;

/// Invalid configuration values
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{channel} magnets must be at least 1")]
    InvalidMagnets { channel: &'static str },

    #[error("Invalid gear table: {0}")]
    Gears(#[from] GearTableError),

    #[error("{name} interval must be non-zero")]
    ZeroInterval { name: &'static str },

    #[error("flush_every must be at least 1")]
    ZeroFlush,
}

fn default_magnets() -> u8 {
    gearsense_core::DEFAULT_WHEEL_MAGNETS
}

fn default_crank_magnets() -> u8 {
    gearsense_core::DEFAULT_CRANK_MAGNETS
}

fn default_measurement_interval() -> Millis {
    MEASUREMENT_INTERVAL_MS
}

fn default_logging_interval() -> Millis {
    LOGGING_INTERVAL_MS
}

fn default_output_interval() -> Millis {
    OUTPUT_INTERVAL_MS
}

fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gearsense")
        .join("sessions")
}

fn default_flush_every() -> usize {
    10
}

/// Persistent application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Magnets on the wheel
    #[serde(default = "default_magnets")]
    pub wheel_magnets: u8,
    /// Magnets on the crank
    #[serde(default = "default_crank_magnets")]
    pub crank_magnets: u8,
    /// Chainring and sprocket tooth counts
    #[serde(default)]
    pub gears: GearSpec,
    /// What to publish on a low-confidence gear match
    #[serde(default)]
    pub gear_policy: LowConfidencePolicy,
    /// RPM computation period in ms
    #[serde(default = "default_measurement_interval")]
    pub measurement_interval_ms: Millis,
    /// Storage and telemetry period in ms
    #[serde(default = "default_logging_interval")]
    pub logging_interval_ms: Millis,
    /// Interval-average report period in ms
    #[serde(default = "default_output_interval")]
    pub output_interval_ms: Millis,
    /// Directory for session CSV files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Flush the session file every N rows
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// UDP peer for telemetry frames (None = telemetry off)
    #[serde(default)]
    pub telemetry: Option<SocketAddr>,
    /// Automatic session start/stop
    #[serde(default)]
    pub auto_session: AutoSession,
    /// Simulated ride used in place of hardware sensors
    #[serde(default)]
    pub ride: RideProfile,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            wheel_magnets: default_magnets(),
            crank_magnets: default_crank_magnets(),
            gears: GearSpec::default(),
            gear_policy: LowConfidencePolicy::default(),
            measurement_interval_ms: default_measurement_interval(),
            logging_interval_ms: default_logging_interval(),
            output_interval_ms: default_output_interval(),
            log_dir: default_log_dir(),
            flush_every: default_flush_every(),
            telemetry: None,
            auto_session: AutoSession::default(),
            ride: RideProfile::default(),
        }
    }
}

impl AppConfig {
    /// Config file path: `<config_dir>/gearsense/config.json`
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gearsense")
            .join("config.json")
    }

    /// Load config from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Check values the engine would otherwise silently coerce
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wheel_magnets == 0 {
            return Err(ConfigError::InvalidMagnets { channel: "wheel" });
        }
        if self.crank_magnets == 0 {
            return Err(ConfigError::InvalidMagnets { channel: "crank" });
        }
        self.gear_table()?;

        for (name, value) in [
            ("measurement", self.measurement_interval_ms),
            ("logging", self.logging_interval_ms),
            ("output", self.output_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval { name });
            }
        }
        if self.flush_every == 0 {
            return Err(ConfigError::ZeroFlush);
        }
        Ok(())
    }

    /// Configured gear table
    pub fn gear_table(&self) -> Result<GearTable, GearTableError> {
        GearTable::try_from(&self.gears)
    }

    /// Ride profile with the configured magnet counts
    pub fn ride_profile(&self) -> RideProfile {
        RideProfile {
            wheel_magnets: self.wheel_magnets,
            crank_magnets: self.crank_magnets,
            ..self.ride
        }
    }
}
