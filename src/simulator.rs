//! Simulated sensor triggers
//!
//! Replaces the wheel and crank reed switches on a host without hardware.
//! A background thread fires triggers on the engine's [`TriggerInput`]
//! handles at the pulse rate implied by a [`RideProfile`], optionally
//! emitting a contact-bounce duplicate that the debounce filter must reject.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use gearsense_core::{Clock, Millis, TriggerInput};
use serde::{Deserialize, Serialize};

/// How often the simulator thread checks the clock
const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn default_wheel_rpm() -> f32 {
    150.0
}

fn default_cadence_rpm() -> f32 {
    75.0
}

fn default_magnets() -> u8 {
    1
}

/// Target ride for the simulator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RideProfile {
    /// Wheel speed in revolutions per minute (0 = stationary)
    #[serde(default = "default_wheel_rpm")]
    pub wheel_rpm: f32,
    /// Crank speed in revolutions per minute (0 = coasting)
    #[serde(default = "default_cadence_rpm")]
    pub cadence_rpm: f32,
    /// Magnets on the wheel
    #[serde(default = "default_magnets")]
    pub wheel_magnets: u8,
    /// Magnets on the crank
    #[serde(default = "default_magnets")]
    pub crank_magnets: u8,
    /// Emit a duplicate trigger with every pulse, like a bouncing reed switch
    #[serde(default)]
    pub bounce: bool,
}

impl Default for RideProfile {
    fn default() -> Self {
        Self {
            wheel_rpm: default_wheel_rpm(),
            cadence_rpm: default_cadence_rpm(),
            wheel_magnets: default_magnets(),
            crank_magnets: default_magnets(),
            bounce: false,
        }
    }
}

impl RideProfile {
    /// Milliseconds between wheel pulses, `None` when not turning
    pub fn wheel_period_ms(&self) -> Option<f64> {
        pulse_period_ms(self.wheel_rpm, self.wheel_magnets)
    }

    /// Milliseconds between crank pulses, `None` when not turning
    pub fn cadence_period_ms(&self) -> Option<f64> {
        pulse_period_ms(self.cadence_rpm, self.crank_magnets)
    }
}

/// Pulse spacing for a given RPM and magnet count
///
/// # Example
/// ```
/// use gearsense::simulator::pulse_period_ms;
///
/// assert_eq!(pulse_period_ms(60.0, 1), Some(1000.0));
/// assert_eq!(pulse_period_ms(60.0, 2), Some(500.0));
/// assert_eq!(pulse_period_ms(0.0, 1), None);
/// ```
pub fn pulse_period_ms(rpm: f32, magnets: u8) -> Option<f64> {
    if rpm <= 0.0 || !rpm.is_finite() || magnets == 0 {
        return None;
    }
    Some(60_000.0 / (rpm as f64 * magnets as f64))
}

#[derive(Debug, Clone, Copy)]
struct ChannelSchedule {
    period_ms: Option<f64>,
    next_due: f64,
}

impl ChannelSchedule {
    fn new(period_ms: Option<f64>, start: Millis) -> Self {
        Self {
            period_ms,
            next_due: start as f64,
        }
    }

    /// True when a pulse is due at `now`; advances the schedule
    fn due(&mut self, now: f64) -> bool {
        let Some(period) = self.period_ms else {
            return false;
        };
        if now < self.next_due {
            return false;
        }
        self.next_due += period;
        // Skip missed pulses instead of bursting after a stall
        if self.next_due <= now {
            self.next_due = now + period;
        }
        true
    }
}

/// Counters from a simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Triggers fired on either channel, bounces included
    pub fired: u64,
    /// Triggers the debounce filter rejected
    pub rejected: u64,
}

/// Deterministic pulse schedule for both channels
///
/// Driven by [`Simulator::spawn`] on a real clock, or stepped directly in tests.
#[derive(Debug, Clone)]
pub struct PulseSchedule {
    profile: RideProfile,
    wheel: ChannelSchedule,
    cadence: ChannelSchedule,
    elapsed_base: u64,
    last_now: Millis,
    stats: SimulatorStats,
}

impl PulseSchedule {
    /// First pulses fire at `start`
    pub fn new(profile: RideProfile, start: Millis) -> Self {
        Self {
            profile,
            wheel: ChannelSchedule::new(profile.wheel_period_ms(), start),
            cadence: ChannelSchedule::new(profile.cadence_period_ms(), start),
            elapsed_base: start as u64,
            last_now: start,
            stats: SimulatorStats::default(),
        }
    }

    /// Fire every pulse due at `now`. Returns the number of triggers fired.
    pub fn fire_due(&mut self, now: Millis, wheel: &TriggerInput, cadence: &TriggerInput) -> u32 {
        // Unwrap the u32 clock into a monotonic f64 timeline
        self.elapsed_base += now.wrapping_sub(self.last_now) as u64;
        self.last_now = now;
        let t = self.elapsed_base as f64;

        let mut fired = 0;
        let bounce = self.profile.bounce;
        for (schedule, input) in [(&mut self.wheel, wheel), (&mut self.cadence, cadence)] {
            if !schedule.due(t) {
                continue;
            }
            let presses = if bounce { 2 } else { 1 };
            for _ in 0..presses {
                fired += 1;
                if !input.record_trigger(now) {
                    self.stats.rejected += 1;
                }
            }
        }
        self.stats.fired += fired as u64;
        fired
    }

    pub fn profile(&self) -> RideProfile {
        self.profile
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }
}

/// Handle to a running simulator thread
pub struct Simulator {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<SimulatorStats>>,
}

impl Simulator {
    /// Start firing triggers in a background thread
    pub fn spawn(
        profile: RideProfile,
        wheel: TriggerInput,
        cadence: TriggerInput,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = std::thread::Builder::new()
            .name("gearsense-simulator".into())
            .spawn(move || {
                let mut schedule = PulseSchedule::new(profile, clock.now_ms());
                while flag.load(Ordering::Relaxed) {
                    schedule.fire_due(clock.now_ms(), &wheel, &cadence);
                    std::thread::sleep(POLL_INTERVAL);
                }
                schedule.stats()
            })?;

        tracing::info!(
            wheel_rpm = profile.wheel_rpm,
            cadence_rpm = profile.cadence_rpm,
            bounce = profile.bounce,
            "Simulated ride started"
        );

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Stop the thread and return its counters
    pub fn stop(mut self) -> SimulatorStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> SimulatorStats {
        self.running.store(false, Ordering::Relaxed);
        let stats = self
            .thread
            .take()
            .and_then(|t| t.join().ok())
            .unwrap_or_default();
        tracing::info!(
            fired = stats.fired,
            rejected = stats.rejected,
            "Simulated ride stopped"
        );
        stats
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}
