//! cachesync CLI
//!
//! Command-line tools for inspecting and repairing a file-backed cache.
//!
//! # Commands
//!
//! - `inspect` - Display record counts per kind and sync state
//! - `pending` - List records awaiting push
//! - `reset` - Abandon a pending mutation
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// cachesync command-line cache tools.
#[derive(Parser)]
#[command(name = "cachesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display record counts per kind and sync state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List records awaiting push
    Pending {
        /// Only list records of this kind
        #[arg(short, long)]
        kind: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Return a pending record to SYNCED without pushing it
    Reset {
        /// Kind of the record
        kind: String,

        /// Entity id of the record
        id: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Pending { kind, format } => {
            let path = cli.path.ok_or("Store path required for pending")?;
            commands::pending::run(&path, kind.as_deref(), &format)?;
        }
        Commands::Reset { kind, id } => {
            let path = cli.path.ok_or("Store path required for reset")?;
            commands::reset::run(&path, &kind, &id)?;
        }
        Commands::Version => {
            println!("cachesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Snapshot format v{}", cachesync_store::FORMAT_VERSION);
        }
    }

    Ok(())
}
