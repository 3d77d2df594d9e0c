//! cloudcal: command-line client for a cloud calendar account.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use cloudcal_cli::cli::{Cli, Command, ConfigAction};
use cloudcal_cli::config::CliConfig;
use cloudcal_cli::error::{CliError, CliResult};
use cloudcal_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
            .with_level(Level::WARN)
            .with_format(TracingOutputFormat::Compact)
    };
    tracing_config.include_target = false;
    if let Err(err) = init_tracing(tracing_config) {
        eprintln!("warning: failed to initialize logging: {err}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = match cli.config {
        Some(ref path) => CliConfig::load_from(path).map_err(CliError::Config)?,
        None => CliConfig::load().map_err(CliError::Config)?,
    };

    match cli.command {
        Command::Login {
            password,
            save,
            no_trust,
        } => cloudcal_cli::commands::login::run(cli.account, password, save, no_trust, &config).await,
        Command::Calendars { json } => {
            cloudcal_cli::commands::calendars::run(cli.account, json, &config).await
        }
        Command::Events {
            days,
            from,
            to,
            json,
        } => cloudcal_cli::commands::events::run(cli.account, days, from, to, json, &config).await,
        Command::Create {
            calendar,
            title,
            start,
            end,
        } => cloudcal_cli::commands::create::run(cli.account, calendar, title, start, end, &config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => cloudcal_cli::commands::config::dump(&config),
            ConfigAction::Validate => cloudcal_cli::commands::config::validate(&config),
            ConfigAction::Path => cloudcal_cli::commands::config::path(),
        },
    }
}
