//! Calendar collection type.
//!
//! A collection is one calendar in the account (work, home, shared). The
//! service versions each collection with an opaque change tag (`ctag`) that
//! rotates whenever any event in it changes; writes must quote the tag they
//! were based on.

use serde::{Deserialize, Serialize};

/// One calendar in the account, as listed by the startup snapshot.
///
/// `guid` and `ctag` are required on the wire; decoding fails loudly when
/// either is missing. The rest default so a sparse snapshot still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCollection {
    /// Stable identifier of the collection.
    pub guid: String,
    /// Opaque version stamp; precondition for writes into this collection.
    pub ctag: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Display color, when the service assigns one (`#rrggbb`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Whether the account may write into this collection.
    #[serde(default)]
    pub read_only: bool,
}

impl CalendarCollection {
    /// Creates a collection with required fields.
    pub fn new(guid: impl Into<String>, ctag: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ctag: ctag.into(),
            title: String::new(),
            color: None,
            read_only: false,
        }
    }
}
