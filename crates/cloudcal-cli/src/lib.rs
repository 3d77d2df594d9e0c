//! Command-line interface for the cloudcal account client.
//!
//! The binary is stateless between invocations: every command builds an
//! [`cloudcal_client::AccountClient`], logs in (silently when a stored
//! trust token lets the sign-in skip the second factor), runs, and exits.
//! `cloudcal login` is the one command allowed to prompt; everything else
//! fails with a pointer to it when the session cannot be established
//! without a terminal.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::{Cli, Command, ConfigAction};
pub use config::CliConfig;
pub use error::{CliError, CliResult};
