//! Monitor CRUD and start/stop: `add`, `list`, `edit`, `rm`, `start`, `stop`.
//!
//! All of these operate on the registry file. When the daemon is running,
//! they additionally drive it over the control socket so its timers and
//! in-memory registry stay coherent; a missing daemon is never an error for
//! file-side operations.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use queuewatch_core::{registry, MonitorConfig, MonitorId};
use queuewatch_daemon::{
    request_reload, request_start_monitor, request_stop_monitor, DaemonError,
};

use super::{home, resolve};

// ---------------------------------------------------------------------------
// add
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display name for the monitor.
    pub name: String,

    /// Endpoint URL to poll.
    #[arg(long)]
    pub url: String,

    /// Name/id of the record to select from multi-record responses.
    #[arg(long)]
    pub filter: Option<String>,

    /// Poll period in seconds. Defaults to 30.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

impl AddArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let mut reg = registry::load_at(&home).context("failed to load monitor registry")?;

        let monitor = MonitorConfig::new(self.name, self.url, self.filter, self.interval);
        let id = monitor.id.clone();
        let name = reg.insert(monitor).name.clone();
        registry::save_at(&home, &reg).context("failed to save monitor registry")?;

        notify_daemon_reload(&home, &id);
        println!("{} Added monitor '{}' ({})", "✓".green(), name, id);
        println!("  Start it with: queuewatch start {id}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct MonitorRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "endpoint")]
    endpoint: String,
    #[tabled(rename = "filter")]
    filter: String,
    #[tabled(rename = "interval")]
    interval: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "last change")]
    last_change: String,
}

impl ListArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let reg = registry::load_at(&home).context("failed to load monitor registry")?;

        if self.json {
            let monitors: Vec<&MonitorConfig> = reg.iter().collect();
            println!("{}", serde_json::to_string_pretty(&monitors)?);
            return Ok(());
        }

        if reg.is_empty() {
            println!("No monitors registered.");
            println!("Run: queuewatch add <name> --url <URL>");
            return Ok(());
        }

        let rows: Vec<MonitorRow> = reg
            .iter()
            .map(|m| MonitorRow {
                name: m.name.clone(),
                id: m.id.0.clone(),
                endpoint: if m.endpoint_url.is_empty() {
                    "(not set)".to_owned()
                } else {
                    m.endpoint_url.clone()
                },
                filter: m.filter_key.clone().unwrap_or_else(|| "-".to_owned()),
                interval: format!("{}s", m.interval_seconds),
                state: if m.is_running {
                    "running".green().to_string()
                } else {
                    "stopped".dimmed().to_string()
                },
                last_change: m
                    .last_difference
                    .as_ref()
                    .map(|d| {
                        format!(
                            "{} -> {}",
                            d.slug_change.previous.as_deref().unwrap_or("(none)"),
                            d.slug_change.current.as_deref().unwrap_or("(none)"),
                        )
                    })
                    .unwrap_or_else(|| "-".to_owned()),
            })
            .collect();

        println!("{}", Table::new(rows).with(Style::rounded()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// edit
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Monitor id or name.
    pub monitor: String,

    /// New display name.
    #[arg(long)]
    pub name: Option<String>,

    /// New endpoint URL.
    #[arg(long)]
    pub url: Option<String>,

    /// New filter key. Pass an empty string to clear it.
    #[arg(long)]
    pub filter: Option<String>,

    /// New poll period in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

impl EditArgs {
    pub fn run(self) -> Result<()> {
        if self.name.is_none()
            && self.url.is_none()
            && self.filter.is_none()
            && self.interval.is_none()
        {
            return Err(anyhow::anyhow!(
                "nothing to change; pass at least one of --name, --url, --filter, --interval"
            ));
        }

        let home = home()?;
        let reg = registry::load_at(&home).context("failed to load monitor registry")?;
        let id = resolve(&reg, &self.monitor)?.id.clone();

        // Editing always stops the timer and never auto-restarts. The daemon
        // persists its state when stopping, so re-read before mutating.
        notify_daemon_stop(&home, &id);

        let mut reg = registry::load_at(&home).context("failed to reload monitor registry")?;
        reg.update(&id, |m| {
            if let Some(name) = self.name {
                m.name = name;
            }
            if let Some(url) = self.url {
                m.endpoint_url = url;
            }
            if let Some(filter) = self.filter {
                m.filter_key = if filter.is_empty() { None } else { Some(filter) };
            }
            if let Some(interval) = self.interval {
                m.interval_seconds = interval;
            }
            m.is_running = false;
        })?;
        registry::save_at(&home, &reg).context("failed to save monitor registry")?;

        notify_daemon_reload(&home, &id);
        println!("{} Updated monitor {id} (stopped; restart with `queuewatch start {id}`)", "✓".green());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// rm
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Monitor id or name.
    pub monitor: String,
}

impl RmArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let reg = registry::load_at(&home).context("failed to load monitor registry")?;
        let id = resolve(&reg, &self.monitor)?.id.clone();

        // Timer first, then the entity.
        notify_daemon_stop(&home, &id);

        let mut reg = registry::load_at(&home).context("failed to reload monitor registry")?;
        let removed = reg.remove(&id)?;
        registry::save_at(&home, &reg).context("failed to save monitor registry")?;

        notify_daemon_reload(&home, &id);
        println!("{} Removed monitor '{}' ({})", "✓".green(), removed.name, id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// start / stop
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct MonitorRef {
    /// Monitor id or name.
    pub monitor: String,
}

pub fn start(args: MonitorRef) -> Result<()> {
    let home = home()?;
    let reg = registry::load_at(&home).context("failed to load monitor registry")?;
    let id = resolve(&reg, &args.monitor)?.id.clone();

    match request_start_monitor(&home, &id.0) {
        Ok(_) => {
            println!("{} Monitor {id} started", "✓".green());
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            let mut reg = reg;
            reg.update(&id, |m| m.is_running = true)?;
            registry::save_at(&home, &reg).context("failed to save monitor registry")?;
            println!(
                "{} Daemon not running; monitor {id} marked to start with `queuewatch run`",
                "✓".green(),
            );
        }
        Err(err) => return Err(err).context("failed to start monitor via daemon"),
    }
    Ok(())
}

pub fn stop(args: MonitorRef) -> Result<()> {
    let home = home()?;
    let reg = registry::load_at(&home).context("failed to load monitor registry")?;
    let id = resolve(&reg, &args.monitor)?.id.clone();

    match request_stop_monitor(&home, &id.0) {
        Ok(_) => {
            println!("{} Monitor {id} stopped", "✓".green());
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            let mut reg = reg;
            reg.update(&id, |m| m.is_running = false)?;
            registry::save_at(&home, &reg).context("failed to save monitor registry")?;
            println!("{} Monitor {id} stopped", "✓".green());
        }
        Err(err) => return Err(err).context("failed to stop monitor via daemon"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Daemon coordination (best-effort)
// ---------------------------------------------------------------------------

fn notify_daemon_stop(home: &std::path::Path, id: &MonitorId) {
    match request_stop_monitor(home, &id.0) {
        Ok(_) | Err(DaemonError::DaemonNotRunning { .. }) => {}
        Err(err) => eprintln!("warning: daemon stop-monitor failed: {err}"),
    }
}

fn notify_daemon_reload(home: &std::path::Path, id: &MonitorId) {
    match request_reload(home, Some(id.0.clone())) {
        Ok(_) | Err(DaemonError::DaemonNotRunning { .. }) => {}
        Err(err) => eprintln!("warning: daemon reload failed: {err}"),
    }
}
