//! `cloudcal login` command.

use cloudcal_client::CredentialVault;
use tracing::debug;

use crate::config::CliConfig;
use crate::error::CliResult;

pub async fn run(
    account: Option<String>,
    password: Option<String>,
    save: bool,
    no_trust: bool,
    config: &CliConfig,
) -> CliResult<()> {
    let mut config = config.clone();
    if no_trust {
        config.account.trust_device = false;
    }

    let established =
        super::session::establish(&config, account.as_deref(), password.as_deref(), true).await?;
    let session = established.client.session();

    println!("Logged in as {}.", session.account());
    if let Some(dsid) = session.dsid() {
        println!("Account id: {dsid}");
    }
    if session.trust_token().is_some() {
        println!("Device is trusted; later sign-ins can skip the second factor.");
    }

    if save || config.account.save_credentials {
        let vault = CredentialVault::new(config.data_dir());
        vault.store(&established.credentials)?;
        debug!(path = %vault.records_path().display(), "credentials stored");
        println!("Credentials stored in the vault.");
    } else {
        println!("Credentials were not stored; pass --save to keep them for later commands.");
    }

    Ok(())
}
