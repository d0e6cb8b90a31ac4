//! `queuewatch poll <monitor>`: one poll cycle, no timer.
//!
//! Mutates the registry exactly as a timer tick would: the snapshot is
//! stored and any detected difference recorded.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use queuewatch_core::registry;
use queuewatch_engine::{
    default_client, run_cycle, CycleOutcome, Notification, NotificationSink, Severity,
};

use super::{home, resolve};

#[derive(Args, Debug)]
pub struct PollArgs {
    /// Monitor id or name.
    pub monitor: String,
}

/// Prints notifications straight to the terminal.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, notification: &Notification) {
        match notification.severity {
            Severity::Info => {
                println!("{} {}: {}", "✓".green(), notification.monitor, notification.message)
            }
            Severity::Error => {
                eprintln!("{} {}: {}", "✗".red(), notification.monitor, notification.message)
            }
        }
    }
}

impl PollArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let reg = registry::load_at(&home).context("failed to load monitor registry")?;
        let id = resolve(&reg, &self.monitor)?.id.clone();

        let registry = Arc::new(tokio::sync::RwLock::new(reg));
        let client = default_client().context("failed to build HTTP client")?;

        let runtime = tokio::runtime::Runtime::new().context("failed to build tokio runtime")?;
        let outcome = runtime.block_on(run_cycle(&client, &home, &registry, &id, &ConsoleSink));

        match outcome {
            Ok(CycleOutcome::Changed { .. }) => Ok(()),
            Ok(CycleOutcome::Snapshot { .. }) => {
                println!("{} No change; snapshot updated", "✓".green());
                Ok(())
            }
            // Already reported through the sink; exit non-zero.
            Err(err) => Err(anyhow::anyhow!("poll cycle failed: {err}")),
        }
    }
}
