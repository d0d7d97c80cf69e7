//! Monitoring loop
//!
//! Drives the [`RpmEngine`] from three tokio intervals (measurement,
//! logging, report), applies console commands and the auto-session policy,
//! and feeds the storage and telemetry collaborators while a session runs.
//!
//! All decisions live in [`Monitor`]'s synchronous handlers so they can be
//! exercised with a [`ManualClock`](gearsense_core::ManualClock); [`run`]
//! only schedules them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use gearsense_core::session::{AutoAction, SessionError, SessionSummary};
use gearsense_core::{
    Clock, IntervalReport, LogRecord, Millis, RpmEngine, SessionTracker, TelemetryFrame,
    TickOutcome,
};
use tokio::time::MissedTickBehavior;

use crate::commands::{Command, HELP_TEXT};
use crate::config::AppConfig;
use crate::storage::SessionLog;
use crate::telemetry::{TelemetrySink, UdpTelemetry};

/// How often the loop checks for commands and shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tick periods for [`run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopIntervals {
    pub measurement: Duration,
    pub logging: Duration,
    pub output: Duration,
}

impl LoopIntervals {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            measurement: Duration::from_millis(config.measurement_interval_ms as u64),
            logging: Duration::from_millis(config.logging_interval_ms as u64),
            output: Duration::from_millis(config.output_interval_ms as u64),
        }
    }
}

/// Engine plus session lifecycle and output collaborators
pub struct Monitor {
    engine: RpmEngine,
    session: SessionTracker,
    storage: Option<SessionLog>,
    telemetry: Option<Box<dyn TelemetrySink>>,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    /// Wrap a started engine. Storage and telemetry are off until attached.
    pub fn new(engine: RpmEngine, session: SessionTracker, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            session,
            storage: None,
            telemetry: None,
            clock,
        }
    }

    /// Build the engine and collaborators described by `config`
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;

        let mut engine = RpmEngine::new(clock.now_ms());
        engine.begin(config.wheel_magnets, config.crank_magnets, clock.now_ms());
        engine.configure_gears(&config.gears.chainrings, &config.gears.sprockets)?;
        engine.set_gear_policy(config.gear_policy);

        let mut monitor = Self::new(engine, SessionTracker::new(config.auto_session), clock)
            .with_storage(SessionLog::new(&config.log_dir, config.flush_every));

        if let Some(peer) = config.telemetry {
            match UdpTelemetry::new(peer) {
                Ok(sink) => monitor = monitor.with_telemetry(Box::new(sink)),
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Telemetry unavailable, continuing without it")
                }
            }
        }
        Ok(monitor)
    }

    pub fn with_storage(mut self, storage: SessionLog) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_telemetry(mut self, sink: Box<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Measurement tick followed by the auto-session policy
    pub fn on_measurement(&mut self, now: Millis, wall: DateTime<Utc>) -> TickOutcome {
        let outcome = self.engine.measurement_tick(now);
        if outcome.wheel_timed_out || outcome.cadence_timed_out {
            tracing::debug!(
                wheel = outcome.wheel_timed_out,
                cadence = outcome.cadence_timed_out,
                "Sensor timeout"
            );
        }

        match self.session.poll_auto(&mut self.engine, now, wall) {
            Some(AutoAction::Started) => self.open_storage(wall),
            Some(AutoAction::Stopped(summary)) => self.finish_session(&summary),
            None => {}
        }
        outcome
    }

    /// Record one row and one telemetry frame while a session is active
    pub fn on_logging(&mut self, now: Millis, wall: DateTime<Utc>) {
        if !self.session.is_active() {
            return;
        }
        let snapshot = self.engine.snapshot();

        if let Some(storage) = self.storage.as_mut() {
            let record = LogRecord::from_snapshot(&snapshot, wall, self.session.elapsed_ms(now));
            storage.append(&record);
        }
        if let Some(sink) = self.telemetry.as_mut() {
            sink.publish(&TelemetryFrame::from_snapshot(&snapshot, wall));
        }
    }

    /// Roll interval averages into the session and log them
    pub fn on_report(&mut self) -> IntervalReport {
        let report = self.engine.report_tick();
        tracing::info!(
            wheel_rpm = self.engine.wheel().instant_rpm(),
            cadence_rpm = self.engine.cadence().instant_rpm(),
            avg_wheel_rpm = report.wheel.average_rpm,
            avg_cadence_rpm = report.cadence.average_rpm,
            gear = %self.engine.gear_description(),
            "RPM report"
        );
        report
    }

    /// Start a session and open its log file
    pub fn start_session(&mut self, now: Millis, wall: DateTime<Utc>) -> Result<(), SessionError> {
        self.session.start(&mut self.engine, now, wall)?;
        self.open_storage(wall);
        Ok(())
    }

    /// Stop the session and close its log file
    pub fn stop_session(&mut self, now: Millis) -> Result<SessionSummary, SessionError> {
        let summary = self.session.stop(&self.engine, now)?;
        self.finish_session(&summary);
        Ok(summary)
    }

    fn open_storage(&mut self, wall: DateTime<Utc>) {
        if let Some(storage) = self.storage.as_mut() {
            storage.open(wall);
        }
    }

    fn finish_session(&mut self, summary: &SessionSummary) {
        if let Some(storage) = self.storage.as_mut() {
            storage.close();
        }
        tracing::info!(
            duration_s = summary.duration_ms / 1000,
            avg_wheel_rpm = summary.avg_wheel_rpm,
            avg_cadence_rpm = summary.avg_cadence_rpm,
            "Session summary"
        );
    }

    /// Apply a console command and return the text to show the user
    pub fn handle_command(&mut self, command: Command, now: Millis, wall: DateTime<Utc>) -> String {
        match command {
            Command::Start => match self.start_session(now, wall) {
                Ok(()) => match self.storage.as_ref().and_then(|s| s.current_path()) {
                    Some(path) => format!("Session started, logging to {}", path.display()),
                    None => "Session started (storage unavailable)".to_string(),
                },
                Err(e) => e.to_string(),
            },
            Command::Stop => match self.stop_session(now) {
                Ok(summary) => format!(
                    "Session stopped after {:.1}s (avg wheel {:.1} RPM, avg cadence {:.1} RPM)",
                    summary.duration_ms as f32 / 1000.0,
                    summary.avg_wheel_rpm,
                    summary.avg_cadence_rpm
                ),
                Err(e) => e.to_string(),
            },
            Command::Status => self.status_text(now),
            Command::Reset => {
                self.engine.reset(now);
                "Measurements reset".to_string()
            }
            Command::Gear => self.engine.gear_description(),
            Command::Help => HELP_TEXT.to_string(),
        }
    }

    /// Multi-line status report
    pub fn status_text(&self, now: Millis) -> String {
        let snap = self.engine.snapshot();
        let session = if self.session.is_active() {
            format!("active ({:.1}s)", self.session.elapsed_ms(now) as f32 / 1000.0)
        } else {
            "idle".to_string()
        };
        let telemetry = match self.telemetry.as_ref() {
            Some(sink) => {
                let stats = sink.stats();
                format!("{} sent, {} failed", stats.sent, stats.failed)
            }
            None => "off".to_string(),
        };
        format!(
            "Wheel:     {:.1} RPM (avg {:.1}, {} pulses)\n\
             Cadence:   {:.1} RPM (avg {:.1}, {} pulses)\n\
             Gear:      {}\n\
             Session:   {}\n\
             Stable:    {}\n\
             Idle:      {} ms\n\
             Telemetry: {}",
            snap.wheel_rpm,
            snap.session_avg_wheel_rpm,
            snap.wheel_pulses,
            snap.cadence_rpm,
            snap.session_avg_cadence_rpm,
            snap.cadence_pulses,
            self.engine.gear_description(),
            session,
            if snap.stabilized { "yes" } else { "no" },
            self.engine.idle_for(now),
            telemetry,
        )
    }

    /// Close any running session
    pub fn shutdown(&mut self, now: Millis) {
        if self.session.is_active() {
            if let Err(e) = self.stop_session(now) {
                tracing::warn!(error = %e, "Failed to stop session on shutdown");
            }
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn engine(&self) -> &RpmEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RpmEngine {
        &mut self.engine
    }

    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    pub fn storage(&self) -> Option<&SessionLog> {
        self.storage.as_ref()
    }
}

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Run the loop until `running` is cleared, then close any open session
pub async fn run(
    monitor: &mut Monitor,
    intervals: LoopIntervals,
    commands: Receiver<Command>,
    running: Arc<AtomicBool>,
) {
    let mut measurement = interval(intervals.measurement);
    let mut logging = interval(intervals.logging);
    let mut output = interval(intervals.output);
    let mut poll = interval(POLL_INTERVAL);

    tracing::info!(
        measurement_ms = intervals.measurement.as_millis() as u64,
        logging_ms = intervals.logging.as_millis() as u64,
        output_ms = intervals.output.as_millis() as u64,
        "Monitoring started"
    );

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = measurement.tick() => {
                let now = monitor.now();
                monitor.on_measurement(now, Utc::now());
            }
            _ = logging.tick() => {
                let now = monitor.now();
                monitor.on_logging(now, Utc::now());
            }
            _ = output.tick() => {
                monitor.on_report();
            }
            _ = poll.tick() => {
                for command in commands.try_iter() {
                    let now = monitor.now();
                    println!("{}", monitor.handle_command(command, now, Utc::now()));
                }
            }
        }
    }

    let now = monitor.now();
    monitor.shutdown(now);
    tracing::info!("Monitoring stopped");
}
