//! `cloudcal create` command.

use chrono::{Local, TimeZone};

use cloudcal_core::{EventIntent, ProviderDate};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

pub async fn run(
    account: Option<String>,
    calendar: String,
    title: String,
    start: String,
    end: String,
    config: &CliConfig,
) -> CliResult<()> {
    let intent = EventIntent::new(title, parse_instant(&start)?, parse_instant(&end)?);

    let mut established = super::session::establish(config, account.as_deref(), None, false).await?;
    let event = established.client.create_event(intent, &calendar).await?;

    println!("Created \"{}\" ({})", event.title, event.guid);
    println!(
        "  {} {:02}:{:02} to {} {:02}:{:02}",
        event.start_date.to_query_date(),
        event.start_date.hour,
        event.start_date.minute,
        event.end_date.to_query_date(),
        event.end_date.hour,
        event.end_date.minute,
    );
    Ok(())
}

/// Parses `YYYY-MM-DDTHH:MM` as a local-time instant.
fn parse_instant(raw: &str) -> CliResult<ProviderDate> {
    let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map_err(|_| CliError::Input(format!("invalid instant {raw:?}; expected YYYY-MM-DDTHH:MM")))?;
    let local = Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| {
            CliError::Input(format!("{raw:?} is ambiguous or skipped in the local timezone"))
        })?;
    Ok(ProviderDate::from_datetime(&local))
}
