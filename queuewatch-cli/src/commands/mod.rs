pub mod monitor;
pub mod poll;
pub mod run;
pub mod status;

use anyhow::{Context, Result};
use std::path::PathBuf;

use queuewatch_core::{MonitorConfig, MonitorId, Registry};

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Resolve a CLI `<monitor>` argument against the registry: exact id first,
/// then unique name.
pub fn resolve<'a>(registry: &'a Registry, needle: &str) -> Result<&'a MonitorConfig> {
    let id = MonitorId::from(needle);
    if let Some(monitor) = registry.get(&id) {
        return Ok(monitor);
    }

    let mut by_name = registry.iter().filter(|m| m.name == needle);
    match (by_name.next(), by_name.next()) {
        (Some(monitor), None) => Ok(monitor),
        (Some(_), Some(_)) => Err(anyhow::anyhow!(
            "monitor name '{needle}' is ambiguous; use the id (see `queuewatch list`)"
        )),
        (None, _) => Err(anyhow::anyhow!(
            "no monitor with id or name '{needle}'; run `queuewatch list`"
        )),
    }
}
