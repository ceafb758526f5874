//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ipset-sync")]
#[command(author, version, about = "Sync a WAFv2 IP set with public threat-intelligence feeds")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (optional; environment overrides apply)
    #[arg(short, long, default_value = "/etc/ipset-sync/config.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (for scheduled runs)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge feed entries into the IP set
    Sync {
        /// Fetch and merge but don't write the IP set
        #[arg(long)]
        dry_run: bool,
    },

    /// Download and parse all feeds without touching the IP set
    Fetch {
        /// Print every entry
        #[arg(long)]
        list: bool,
    },

    /// Show the current IP set
    Show,

    /// List configured feeds
    Sources,

    /// Show version
    Version,
}
