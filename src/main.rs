//! Gearsense - bicycle wheel/cadence RPM and gear monitor
//!
//! Entry point for the console monitor. Sensor triggers come from the
//! simulated ride until hardware inputs are wired to the trigger handles.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gearsense::commands::{self, HELP_TEXT};
use gearsense::config::AppConfig;
use gearsense::monitor::{self, LoopIntervals, Monitor};
use gearsense::simulator::Simulator;
use gearsense::timing::Clock;
use gearsense::SystemClock;
use tracing::{info, warn};

/// Command-line overrides on top of the config file
#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    wheel_rpm: Option<f32>,
    cadence_rpm: Option<f32>,
    log_dir: Option<PathBuf>,
    telemetry: Option<SocketAddr>,
    auto: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gearsense=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(());
    };

    let mut config = match &options.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    apply_overrides(&mut config, &options);
    config.validate().context("Invalid configuration")?;

    println!("╔════════════════════════════════════════════════════════════╗");
    println!(
        "║            Gearsense v{} - Cadence & Gear Monitor          ║",
        gearsense::VERSION
    );
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("{}", HELP_TEXT);
    println!();

    run(config)
}

fn run(config: AppConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let mut monitor = Monitor::from_config(&config, clock.clone())?;

    let simulator = Simulator::spawn(
        config.ride_profile(),
        monitor.engine().wheel_input(),
        monitor.engine().cadence_input(),
        clock,
    )
    .context("Failed to start simulated sensors")?;

    let (tx, rx) = crossbeam_channel::bounded(16);
    commands::spawn_stdin_reader(tx).context("Failed to start command reader")?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl+C handler");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to create Tokio runtime")?;
    runtime.block_on(monitor::run(
        &mut monitor,
        LoopIntervals::from_config(&config),
        rx,
        running,
    ));

    simulator.stop();
    info!("Done");
    Ok(())
}

/// Parse flags. Returns `None` when the program should exit (help, version).
fn parse_args(args: &[String]) -> Result<Option<CliOptions>> {
    let mut options = CliOptions::default();
    let mut i = 1;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--version" | "-v" => {
                println!("gearsense {} ({})", gearsense::VERSION, gearsense::BUILD_DATE);
                return Ok(None);
            }
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--config" | "-c" => options.config = Some(PathBuf::from(take_value(args, &mut i, flag)?)),
            "--wheel-rpm" => {
                let v = take_value(args, &mut i, flag)?;
                options.wheel_rpm =
                    Some(v.parse().with_context(|| format!("Invalid wheel RPM: {}", v))?);
            }
            "--cadence-rpm" => {
                let v = take_value(args, &mut i, flag)?;
                options.cadence_rpm =
                    Some(v.parse().with_context(|| format!("Invalid cadence RPM: {}", v))?);
            }
            "--log-dir" => options.log_dir = Some(PathBuf::from(take_value(args, &mut i, flag)?)),
            "--telemetry" => {
                let v = take_value(args, &mut i, flag)?;
                options.telemetry =
                    Some(v.parse().with_context(|| format!("Invalid telemetry address: {}", v))?);
            }
            "--auto" => options.auto = true,
            other => {
                print_help();
                bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    Ok(Some(options))
}

fn take_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    match args.get(*i) {
        Some(v) => Ok(v.as_str()),
        None => bail!("{} requires a value", flag),
    }
}

fn apply_overrides(config: &mut AppConfig, options: &CliOptions) {
    if let Some(rpm) = options.wheel_rpm {
        config.ride.wheel_rpm = rpm;
    }
    if let Some(rpm) = options.cadence_rpm {
        config.ride.cadence_rpm = rpm;
    }
    if let Some(dir) = &options.log_dir {
        config.log_dir = dir.clone();
    }
    if options.telemetry.is_some() {
        config.telemetry = options.telemetry;
    }
    if options.auto {
        config.auto_session.auto_start = true;
    }
}

fn print_help() {
    println!("Usage: gearsense [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config PATH       Config file (default: {})", AppConfig::path().display());
    println!("      --wheel-rpm RPM     Simulated wheel speed");
    println!("      --cadence-rpm RPM   Simulated pedaling cadence");
    println!("      --log-dir DIR       Directory for session CSV files");
    println!("      --telemetry ADDR    Send telemetry frames to ADDR (host:port)");
    println!("      --auto              Start sessions automatically once readings settle");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  gearsense --wheel-rpm 180 --cadence-rpm 85");
    println!("  gearsense --telemetry 192.168.4.1:4210 --auto");
}
