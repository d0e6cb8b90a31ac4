//! `queuewatch status`: daemon runtime status over the control socket.

use anyhow::{Context, Result};
use clap::Args;

use queuewatch_daemon::{paths::socket_path, request_status, DaemonError};

use super::home;

#[derive(Args, Debug)]
pub struct StatusArgs {}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        }
        Ok(())
    }
}
