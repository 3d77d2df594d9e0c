//! `cloudcal events` command.

use chrono::{Datelike, Duration, Local};

use cloudcal_core::{DateRange, ProviderDate};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

pub async fn run(
    account: Option<String>,
    days: u32,
    from: Option<String>,
    to: Option<String>,
    json: bool,
    config: &CliConfig,
) -> CliResult<()> {
    let range = window(days, from.as_deref(), to.as_deref())?;
    let mut established = super::session::establish(config, account.as_deref(), None, false).await?;
    let events = established.client.list_events(&range).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&events)
            .map_err(|e| CliError::Render(e.to_string()))?;
        println!("{rendered}");
        return Ok(());
    }

    if events.is_empty() {
        println!(
            "No events between {} and {}.",
            range.start.to_query_date(),
            range.end.to_query_date()
        );
        return Ok(());
    }
    for event in &events {
        let start = &event.start_date;
        let when = if event.all_day {
            format!("{} (all day)", start.to_query_date())
        } else {
            format!("{} {:02}:{:02}", start.to_query_date(), start.hour, start.minute)
        };
        println!("{when}  {}", event.title);
        if let Some(ref location) = event.location {
            println!("{:18}{location}", "");
        }
    }
    Ok(())
}

/// Builds the query window: an explicit `from`/`to` pair when given,
/// otherwise now plus `days`.
fn window(days: u32, from: Option<&str>, to: Option<&str>) -> CliResult<DateRange> {
    let (start, end) = match (from, to) {
        (Some(from), Some(to)) => (parse_day(from, 0, 0)?, parse_day(to, 23, 59)?),
        _ => {
            let now = Local::now();
            let start = ProviderDate::from_datetime(&now);
            let end = ProviderDate::from_datetime(&(now + Duration::days(i64::from(days))));
            (start, end)
        }
    };
    DateRange::new(start, end).map_err(|e| CliError::Input(e.to_string()))
}

fn parse_day(raw: &str, hour: u32, minute: u32) -> CliResult<ProviderDate> {
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| CliError::Input(format!("invalid date {raw:?}; expected YYYY-MM-DD")))?;
    ProviderDate::new(date.year(), date.month(), date.day(), hour, minute, 0)
        .map_err(|e| CliError::Input(e.to_string()))
}
