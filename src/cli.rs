use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[clap(bin_name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Path to the configuration file
    #[clap(name = "config")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show what is happening now and what is next
    Status {
        /// Instant to answer for, RFC 3339 or `YYYY-MM-DD HH:MM` local time;
        /// defaults to the override, then to now
        #[clap(long)]
        at: Option<String>,
        /// Print the status as JSON
        #[clap(long)]
        json: bool,
    },
    /// List the cached events
    Events {
        #[clap(long)]
        at: Option<String>,
    },
    /// Fetch the feed now, regardless of the cache
    Refresh,
    /// Administer the clock override
    Override {
        #[clap(subcommand)]
        action: OverrideAction,
    },
    /// Print the status periodically, refreshing the feed in the background
    Watch,
}

#[derive(Debug, Clone, Subcommand)]
pub enum OverrideAction {
    /// Answer every query as if it were TIME
    Set { time: String },
    Clear,
    Show,
}
