//! Queuewatch: endpoint change-monitoring CLI.
//!
//! # Usage
//!
//! ```text
//! queuewatch add <name> --url <URL> [--filter <KEY>] [--interval <SECS>]
//! queuewatch list [--json]
//! queuewatch edit <monitor> [--name ...] [--url ...] [--filter ...] [--interval ...]
//! queuewatch rm <monitor>
//! queuewatch start <monitor>
//! queuewatch stop <monitor>
//! queuewatch poll <monitor>
//! queuewatch run
//! queuewatch shutdown
//! queuewatch status
//! ```
//!
//! `<monitor>` accepts either the monitor id or its (unique) name.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    monitor::{AddArgs, EditArgs, ListArgs, MonitorRef, RmArgs},
    poll::PollArgs,
    status::StatusArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "queuewatch",
    version,
    about = "Watch HTTP endpoints for slug changes across polls",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a new monitor (created stopped).
    Add(AddArgs),

    /// List registered monitors.
    List(ListArgs),

    /// Edit a monitor's fields. Editing always stops its timer first.
    Edit(EditArgs),

    /// Delete a monitor (its timer is stopped first).
    Rm(RmArgs),

    /// Start a monitor's recurring poll timer.
    Start(MonitorRef),

    /// Stop a monitor's recurring poll timer.
    Stop(MonitorRef),

    /// Execute a single poll cycle for a monitor, without a timer.
    Poll(PollArgs),

    /// Run the polling daemon in the foreground.
    Run,

    /// Ask a running daemon to shut down.
    Shutdown,

    /// Query daemon runtime status over its control socket.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Add(args) => args.run(),
        Commands::List(args) => args.run(),
        Commands::Edit(args) => args.run(),
        Commands::Rm(args) => args.run(),
        Commands::Start(args) => commands::monitor::start(args),
        Commands::Stop(args) => commands::monitor::stop(args),
        Commands::Poll(args) => args.run(),
        Commands::Run => commands::run::run(),
        Commands::Shutdown => commands::run::shutdown(),
        Commands::Status(args) => args.run(),
    }
}
