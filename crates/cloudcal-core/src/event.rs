//! Calendar event types.
//!
//! [`CalendarEvent`] is the event as the service encodes it: identifiers,
//! the 7-element start/end dates, and the optional descriptive and
//! recurrence fields. [`EventIntent`] is the thin contract with the
//! sentence-extraction collaborator: it hands us a title and two instants,
//! and [`CalendarEvent::from_intent`] turns that into a writable event.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pdate::ProviderDate;

/// One calendar event in the provider's wire shape.
///
/// `guid`, `p_guid` and both dates are required; decoding fails loudly when
/// any is missing or malformed. Everything else defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// Identifier of the event itself.
    pub guid: String,
    /// Identifier of the parent collection the event lives in.
    pub p_guid: String,
    /// Event start, wall clock plus UTC offset.
    pub start_date: ProviderDate,
    /// Event end, never earlier than the start under calendar order.
    pub end_date: ProviderDate,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    /// Duration in minutes, when the service materializes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    /// IANA timezone name the event was authored in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
    /// Recurrence rule string for repeating events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    /// Guid of the series master when this is a detached instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_master: Option<String>,
    /// Whether this instance was edited apart from its series.
    #[serde(default)]
    pub recurrence_exception: bool,
    /// Per-event version stamp; informational, writes are guarded by the
    /// collection ctag instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl CalendarEvent {
    /// Creates an event with required fields; the rest default.
    pub fn new(
        guid: impl Into<String>,
        p_guid: impl Into<String>,
        start_date: ProviderDate,
        end_date: ProviderDate,
    ) -> Self {
        Self {
            guid: guid.into(),
            p_guid: p_guid.into(),
            start_date,
            end_date,
            title: String::new(),
            description: None,
            location: None,
            all_day: false,
            duration: None,
            tz: None,
            recurrence: None,
            recurrence_master: None,
            recurrence_exception: false,
            etag: None,
        }
    }

    /// Builds a new writable event from an extraction intent.
    ///
    /// Generates a fresh uppercase v4 guid the way the service mints its
    /// own, and materializes the duration when the instants convert.
    pub fn from_intent(intent: EventIntent, p_guid: impl Into<String>) -> Self {
        let guid = Uuid::new_v4().to_string().to_uppercase();
        let duration = intent.start.minutes_until(&intent.end).ok();
        Self {
            title: intent.title,
            duration,
            ..Self::new(guid, p_guid, intent.start, intent.end)
        }
    }

    /// Whether the dates satisfy the provider's ordering requirement.
    pub fn dates_ordered(&self) -> bool {
        self.start_date <= self.end_date
    }
}

/// The caller's request to create an event: a title and two instants.
/// Guid assignment and collection placement happen at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventIntent {
    pub title: String,
    pub start: ProviderDate,
    pub end: ProviderDate,
}

impl EventIntent {
    pub fn new(title: impl Into<String>, start: ProviderDate, end: ProviderDate) -> Self {
        Self {
            title: title.into(),
            start,
            end,
        }
    }
}
