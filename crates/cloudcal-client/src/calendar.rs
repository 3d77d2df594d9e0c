//! Calendar reads and ctag-guarded writes.

use std::sync::Arc;

use chrono::Utc;
use cloudcal_core::{CalendarCollection, CalendarEvent, DateRange, ProviderDate};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::session::Session;
use crate::transport::{HttpRequest, Transport, check_status, endpoint};

/// Monthly snapshot. The wire shape also carries the window's events, but
/// only the collection list is consumed here.
#[derive(Debug, Deserialize)]
struct StartupResponse {
    #[serde(rename = "Collection", default)]
    collections: Vec<CalendarCollection>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(rename = "Event", default)]
    events: Vec<CalendarEvent>,
}

/// Wire client for the calendar web service.
///
/// Reads are idempotent; writes carry the owning collection's ctag so the
/// provider can reject anything based on a stale view. A 421 from any call
/// means the session cookies expired, which the caller recovers from by
/// re-authenticating, not by retrying the call as-is.
pub struct CalendarApi {
    calendar_url: Url,
    transport: Arc<Transport>,
    usertz: String,
}

impl CalendarApi {
    pub fn new(calendar_url: Url, transport: Arc<Transport>, usertz: impl Into<String>) -> Self {
        Self {
            calendar_url,
            transport,
            usertz: usertz.into(),
        }
    }

    /// Points the client at the account-specific host named by the cookie
    /// exchange.
    pub fn set_calendar_url(&mut self, url: Url) {
        self.calendar_url = url;
    }

    /// Fetches the collection list from the current month's snapshot.
    ///
    /// A snapshot without a `Collection` array yields an empty list, never
    /// an error.
    pub async fn list_calendars(&self, session: &Session) -> ClientResult<Vec<CalendarCollection>> {
        let window = DateRange::month_of(&ProviderDate::from_datetime(&Utc::now()));
        let url = self.read_url("startup", &window, session.require_dsid()?)?;
        debug!(start = %window.start.to_query_date(), end = %window.end.to_query_date(), "fetching calendar snapshot");

        let request = HttpRequest::get(url).with_headers(session.auth_headers());
        let response = self.transport.send(request).await?;
        check_status(response.status, "calendar snapshot")?;

        let snapshot: StartupResponse = response.json()?;
        debug!(collections = snapshot.collections.len(), "snapshot decoded");
        Ok(snapshot.collections)
    }

    /// Fetches the events between `range.start` and `range.end` inclusive.
    pub async fn list_events(
        &self,
        session: &Session,
        range: &DateRange,
    ) -> ClientResult<Vec<CalendarEvent>> {
        let url = self.read_url("events", range, session.require_dsid()?)?;
        debug!(start = %range.start.to_query_date(), end = %range.end.to_query_date(), "fetching events");

        let request = HttpRequest::get(url).with_headers(session.auth_headers());
        let response = self.transport.send(request).await?;
        check_status(response.status, "event query")?;

        let decoded: EventsResponse = response.json()?;
        debug!(events = decoded.events.len(), "events decoded");
        Ok(decoded.events)
    }

    /// Creates or updates one event, keyed by `(event.p_guid, event.guid)`.
    ///
    /// `calendar_ctag` must be the ctag of the owning collection as most
    /// recently read; the provider rejects the write when its current ctag
    /// differs. Returns whether the provider accepted the write. A stale
    /// session (421) and a version conflict are typed errors instead, since
    /// the first is recoverable by re-login and the second by re-reading
    /// the collection.
    pub async fn upsert_event(
        &self,
        session: &Session,
        event: &CalendarEvent,
        calendar_ctag: &str,
    ) -> ClientResult<bool> {
        validate_for_write(event)?;
        let dsid = session.require_dsid()?.to_string();

        let path = format!(
            "events/{}/{}",
            urlencoding::encode(&event.p_guid),
            urlencoding::encode(&event.guid)
        );
        let mut url = endpoint(&self.calendar_url, &path)?;
        url.query_pairs_mut()
            .append_pair("startDate", &event.start_date.to_query_date())
            .append_pair("endDate", &event.end_date.to_query_date())
            .append_pair("usertz", &self.usertz)
            .append_pair("dsid", &dsid);

        let body = json!({
            "Event": event,
            "ClientState": {
                "Collection": [{ "guid": event.p_guid, "ctag": calendar_ctag }],
                "fullState": false,
            },
        });
        debug!(guid = %event.guid, collection = %event.p_guid, "writing event");

        let request = HttpRequest::post(url)
            .with_headers(session.auth_headers())
            .with_json_body(body);
        let response = self.transport.send(request).await?;

        match response.status {
            status if (200..300).contains(&status) => Ok(true),
            421 => Err(ClientError::stale_session(
                "event write refused: session cookies expired",
            )),
            409 | 412 => Err(ClientError::write_conflict(format!(
                "event write refused: collection {} moved past the supplied ctag",
                event.p_guid
            ))),
            status => {
                warn!(status, guid = %event.guid, "event write failed");
                Ok(false)
            }
        }
    }

    fn read_url(&self, path: &str, window: &DateRange, dsid: &str) -> ClientResult<Url> {
        let mut url = endpoint(&self.calendar_url, path)?;
        url.query_pairs_mut()
            .append_pair("startDate", &window.start.to_query_date())
            .append_pair("endDate", &window.end.to_query_date())
            .append_pair("dsid", dsid)
            .append_pair("usertz", &self.usertz);
        Ok(url)
    }
}

fn validate_for_write(event: &CalendarEvent) -> ClientResult<()> {
    if event.p_guid.trim().is_empty() {
        return Err(ClientError::invalid_event(
            "event names no parent collection",
        ));
    }
    if event.guid.trim().is_empty() {
        return Err(ClientError::invalid_event("event has no guid"));
    }
    if !event.dates_ordered() {
        return Err(ClientError::invalid_event(format!(
            "event ends ({}) before it starts ({})",
            event.end_date.to_query_date(),
            event.start_date.to_query_date()
        )));
    }
    Ok(())
}
