//! Shared session establishment.
//!
//! Every command needs a logged-in [`AccountClient`]. The binary holds no
//! session state between runs, so each invocation signs in from scratch;
//! a stored trust token usually lets that happen without a second factor.

use std::io::{self, Write};

use cloudcal_client::{
    AccountClient, ClientErrorCode, CredentialVault, Credentials, LoginOutcome,
};
use tracing::debug;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// A logged-in client plus the credentials that got it there.
pub(crate) struct Established {
    pub client: AccountClient,
    pub credentials: Credentials,
}

/// Builds the account client and logs it in.
///
/// The password is taken from, in order: the explicit value, the encrypted
/// vault, the configuration file, and finally a terminal prompt. Prompts
/// (password and second factor) are only offered when `interactive` is set;
/// other callers get an error pointing at `cloudcal login`.
pub(crate) async fn establish(
    config: &CliConfig,
    account_flag: Option<&str>,
    password_flag: Option<&str>,
    interactive: bool,
) -> CliResult<Established> {
    let username = resolve_username(config, account_flag, interactive)?;

    let service = config.to_service_config().map_err(CliError::Config)?;
    let account = config.to_account_config(&username);
    let vault = CredentialVault::new(config.data_dir());
    let mut client = AccountClient::new(service, account)?;

    let password = resolve_password(config, &username, password_flag, &vault, interactive)?;

    let outcome = client.login(&username, &password).await?;
    if matches!(outcome, LoginOutcome::MfaRequired) {
        if !interactive {
            return Err(CliError::Auth(
                "the account needs a second factor; run `cloudcal login`".to_string(),
            ));
        }
        complete_second_factor(&mut client).await?;
    }
    debug!(account = %username, "session established");

    Ok(Established {
        client,
        credentials: Credentials::new(username, password),
    })
}

fn resolve_username(
    config: &CliConfig,
    account_flag: Option<&str>,
    interactive: bool,
) -> CliResult<String> {
    if let Some(username) = account_flag {
        return Ok(username.to_string());
    }
    if let Some(ref username) = config.account.username {
        return Ok(username.clone());
    }
    if interactive {
        let username = prompt_line("Account (email)")?;
        if username.is_empty() {
            return Err(CliError::Input("no account given".to_string()));
        }
        return Ok(username);
    }
    Err(CliError::Config(format!(
        "no account configured; add `username` under [account] in {} or pass --account",
        CliConfig::default_path().display()
    )))
}

fn resolve_password(
    config: &CliConfig,
    username: &str,
    explicit: Option<&str>,
    vault: &CredentialVault,
    interactive: bool,
) -> CliResult<String> {
    if let Some(password) = explicit {
        return Ok(password.to_string());
    }
    match vault.load() {
        Ok(Some(stored)) if stored.username == username => {
            debug!("using vaulted credentials");
            return Ok(stored.password);
        }
        Ok(_) => {}
        Err(err) => debug!(error = %err, "vault unreadable, falling back"),
    }
    if let Some(password) = config.resolve_password().map_err(CliError::Config)? {
        return Ok(password);
    }
    if interactive {
        let password = rpassword::prompt_password(format!("Password for {username}: "))?;
        if password.is_empty() {
            return Err(CliError::Input("empty password".to_string()));
        }
        return Ok(password);
    }
    Err(CliError::Auth(
        "no stored password; run `cloudcal login --save` or set `password` under [account]"
            .to_string(),
    ))
}

/// Prompts for verification codes until the provider accepts one. An empty
/// line aborts.
async fn complete_second_factor(client: &mut AccountClient) -> CliResult<()> {
    eprintln!("A verification code was sent to your trusted devices.");
    loop {
        let code = prompt_line("Code")?;
        if code.is_empty() {
            return Err(CliError::Input(
                "aborted at the second-factor prompt".to_string(),
            ));
        }
        match client.provide_code(&code).await {
            Ok(_) => return Ok(()),
            Err(err) if err.code() == ClientErrorCode::CodeRejected => {
                eprintln!("Code rejected; try again (empty line to abort).");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Reads one trimmed line from stdin, echoing the prompt to stderr so that
/// `--json` output stays clean.
pub(crate) fn prompt_line(label: &str) -> CliResult<String> {
    eprint!("{label}: ");
    io::stderr().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
