//! Recording session lifecycle
//!
//! A session is the span between an explicit (or automatic) start and stop.
//! The tracker only keeps the lifecycle; session RPM averages live in the
//! [`RpmEngine`](crate::engine::RpmEngine) and are read at stop time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::RpmEngine;
use crate::timing::{elapsed, Millis};

/// Errors from session lifecycle calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session already active")]
    AlreadyActive,

    #[error("No active session")]
    NotActive,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not recording
    #[default]
    Idle,
    /// Recording since `started_at`
    Active {
        /// Engine timestamp at start
        started_at: Millis,
        /// Wall clock at start
        started_wall: DateTime<Utc>,
    },
}

/// What a finished session looked like
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub started_wall: DateTime<Utc>,
    pub duration_ms: Millis,
    pub avg_wheel_rpm: f32,
    pub avg_cadence_rpm: f32,
}

/// Automatic start/stop policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoSession {
    /// Start a session once readings are stabilized and the rider is active
    pub auto_start: bool,
    /// Stop after this long without an accepted trigger (None = never)
    pub idle_stop_ms: Option<Millis>,
}

/// Lifecycle decision from [`SessionTracker::poll_auto`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutoAction {
    Started,
    Stopped(SessionSummary),
}

/// Tracks whether a recording session is running
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    state: SessionState,
    auto: AutoSession,
}

impl SessionTracker {
    /// Create an idle tracker with the given auto policy
    pub fn new(auto: AutoSession) -> Self {
        Self {
            state: SessionState::Idle,
            auto,
        }
    }

    /// Start a session and reset the engine's session accumulators
    pub fn start(
        &mut self,
        engine: &mut RpmEngine,
        now: Millis,
        wall: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        engine.start_session(now);
        self.state = SessionState::Active {
            started_at: now,
            started_wall: wall,
        };
        tracing::info!(started_at = now, "Session started");
        Ok(())
    }

    /// Stop the running session and summarize it
    pub fn stop(&mut self, engine: &RpmEngine, now: Millis) -> Result<SessionSummary, SessionError> {
        let SessionState::Active {
            started_at,
            started_wall,
        } = self.state
        else {
            return Err(SessionError::NotActive);
        };

        let summary = SessionSummary {
            started_wall,
            duration_ms: elapsed(now, started_at),
            avg_wheel_rpm: engine.wheel().session_avg_rpm(),
            avg_cadence_rpm: engine.cadence().session_avg_rpm(),
        };
        self.state = SessionState::Idle;
        tracing::info!(
            duration_ms = summary.duration_ms,
            avg_wheel_rpm = summary.avg_wheel_rpm,
            avg_cadence_rpm = summary.avg_cadence_rpm,
            "Session stopped"
        );
        Ok(summary)
    }

    /// Apply the auto policy. Call once per measurement tick.
    pub fn poll_auto(
        &mut self,
        engine: &mut RpmEngine,
        now: Millis,
        wall: DateTime<Utc>,
    ) -> Option<AutoAction> {
        if self.is_active() {
            let idle_limit = self.auto.idle_stop_ms?;
            if engine.idle_for(now) > idle_limit {
                tracing::info!(idle_ms = engine.idle_for(now), "No activity, stopping session");
                return self.stop(engine, now).ok().map(AutoAction::Stopped);
            }
            return None;
        }

        if self.auto.auto_start && engine.has_activity() && engine.is_stabilized(now) {
            return self.start(engine, now, wall).ok().map(|_| AutoAction::Started);
        }
        None
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Milliseconds since the session started (0 when idle)
    pub fn elapsed_ms(&self, now: Millis) -> Millis {
        match self.state {
            SessionState::Active { started_at, .. } => elapsed(now, started_at),
            SessionState::Idle => 0,
        }
    }

    pub fn auto_policy(&self) -> AutoSession {
        self.auto
    }
}
