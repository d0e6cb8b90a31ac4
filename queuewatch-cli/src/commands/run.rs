//! `queuewatch run` / `queuewatch shutdown`: foreground daemon and its
//! remote stop. `run` restores running monitors and serves the control
//! socket until ctrl-c or a `stop` request arrives.

use anyhow::{Context, Result};
use colored::Colorize;

use queuewatch_daemon::{request_stop, start_blocking, DaemonError};

use super::home;

pub fn run() -> Result<()> {
    let home = home()?;
    start_blocking(&home).context("daemon exited with error")
}

pub fn shutdown() -> Result<()> {
    let home = home()?;
    match request_stop(&home) {
        Ok(()) => {
            println!("{} Daemon stopping", "✓".green());
            Ok(())
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            println!("Daemon is not running.");
            Ok(())
        }
        Err(err) => Err(err).context("failed to stop daemon"),
    }
}
