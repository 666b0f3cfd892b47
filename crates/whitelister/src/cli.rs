//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Manage player whitelists on game servers over RCON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "whitelister.toml")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the status of every configured server
    Status {
        /// Report from existing state without opening connections
        #[arg(long)]
        passive: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep checking server status until interrupted
    Watch {
        /// Seconds between status checks
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },

    /// Print the whitelist of a server
    List { server: String },

    /// Add a player to a server's whitelist
    Add { server: String, player: String },

    /// Remove a player from a server's whitelist
    Remove { server: String, player: String },

    /// Check that an RCON endpoint accepts a password
    Verify {
        #[arg(long)]
        host: String,

        #[arg(long, default_value_t = 25575)]
        port: u16,

        #[arg(long)]
        password: String,
    },
}
