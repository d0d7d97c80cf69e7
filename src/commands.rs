//! Line-based control commands
//!
//! Commands arrive one per line (stdin on a host, a serial console on a
//! device) and are forwarded to the monitoring loop over a crossbeam channel.

use std::io::BufRead;
use std::str::FromStr;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use thiserror::Error;

/// Help text listing every command
pub const HELP_TEXT: &str = "\
Commands:
  start   - Start a new recording session
  stop    - Stop the current session
  status  - Show current readings and session state
  reset   - Reset all measurements
  gear    - Show the current gear estimate
  help    - Show this help";

/// A parsed control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Reset,
    Gear,
    Help,
}

/// Command parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: '{0}' (type 'help' for a list)")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim();
        match word.to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "status" => Ok(Command::Status),
            "reset" => Ok(Command::Reset),
            "gear" => Ok(Command::Gear),
            "help" => Ok(Command::Help),
            _ => Err(CommandError::Unknown(word.to_string())),
        }
    }
}

/// Parse lines from `reader` and send valid commands on `tx`.
///
/// Blank lines are skipped and unknown commands are logged. Returns the
/// number of commands forwarded once the reader is exhausted or the
/// receiver is gone.
pub fn forward_commands<R: BufRead>(reader: R, tx: &Sender<Command>) -> usize {
    let mut forwarded = 0;
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read command input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.send(command).is_err() {
                    break;
                }
                forwarded += 1;
            }
            Err(e) => {
                tracing::warn!("{}", e);
                println!("{}", e);
            }
        }
    }
    forwarded
}

/// Read commands from stdin on a background thread
pub fn spawn_stdin_reader(tx: Sender<Command>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("gearsense-commands".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let forwarded = forward_commands(stdin.lock(), &tx);
            tracing::debug!(forwarded, "Command input closed");
        })
}
