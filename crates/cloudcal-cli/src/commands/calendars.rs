//! `cloudcal calendars` command.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

pub async fn run(account: Option<String>, json: bool, config: &CliConfig) -> CliResult<()> {
    let mut established = super::session::establish(config, account.as_deref(), None, false).await?;
    let calendars = established.client.list_calendars().await?;

    if json {
        let rendered = serde_json::to_string_pretty(&calendars)
            .map_err(|e| CliError::Render(e.to_string()))?;
        println!("{rendered}");
        return Ok(());
    }

    if calendars.is_empty() {
        println!("No calendars.");
        return Ok(());
    }
    for calendar in &calendars {
        let title = if calendar.title.is_empty() {
            &calendar.guid
        } else {
            &calendar.title
        };
        let access = if calendar.read_only { " (read-only)" } else { "" };
        println!("{title}{access}");
        println!("  guid: {}", calendar.guid);
        println!("  ctag: {}", calendar.ctag);
    }
    Ok(())
}
