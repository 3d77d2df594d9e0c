//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "cloudcal")]
#[command(version, about = "Cloud calendar client: login, calendars, events")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, short, env = "CLOUDCAL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Account name, overriding the configuration file
    #[arg(long, env = "CLOUDCAL_ACCOUNT", global = true)]
    pub account: Option<String>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in, completing the second-factor prompt if one is needed
    Login {
        /// Password; prompted for when absent
        #[arg(long, env = "CLOUDCAL_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Store the credentials in the encrypted vault for later commands
        #[arg(long)]
        save: bool,

        /// Do not ask the provider to trust this device
        #[arg(long)]
        no_trust: bool,
    },

    /// List the account's calendars
    Calendars {
        /// Print raw JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// List events in a date window
    Events {
        /// Days ahead to include, starting now
        #[arg(long, default_value_t = 7, conflicts_with_all = ["from", "to"])]
        days: u32,

        /// Window start (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// Window end (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<String>,

        /// Print raw JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Create an event
    Create {
        /// Guid of the calendar to create into
        #[arg(long)]
        calendar: String,

        /// Event title
        #[arg(long)]
        title: String,

        /// Start instant in local time (YYYY-MM-DDTHH:MM)
        #[arg(long)]
        start: String,

        /// End instant in local time (YYYY-MM-DDTHH:MM)
        #[arg(long)]
        end: String,
    },

    /// Inspect or validate the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,
    /// Check that the configuration parses and its references resolve
    Validate,
    /// Print the configuration file path
    Path,
}
