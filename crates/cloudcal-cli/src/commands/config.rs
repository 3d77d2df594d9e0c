//! Configuration commands.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &CliConfig) -> CliResult<()> {
    let rendered =
        toml::to_string_pretty(config).map_err(|e| CliError::Render(e.to_string()))?;
    println!("# config.toml ({})", CliConfig::default_path().display());
    println!("{rendered}");
    Ok(())
}

/// Validate the configuration: endpoints, account settings and secret
/// references.
pub fn validate(config: &CliConfig) -> CliResult<()> {
    config.to_service_config().map_err(CliError::Config)?;

    if let Some(ref username) = config.account.username {
        config.to_account_config(username).validate()?;
    } else {
        println!("No [account] username set; commands will need --account.");
    }

    if config.account.password.is_some() {
        config.resolve_password().map_err(CliError::Config)?;
        println!("Password reference resolves.");
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> CliResult<()> {
    println!("config: {}", CliConfig::default_path().display());
    Ok(())
}
