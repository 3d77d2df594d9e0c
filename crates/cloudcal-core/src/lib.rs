//! Core types: provider dates, calendar collections, events, tracing

pub mod calendar;
pub mod event;
pub mod pdate;
pub mod tracing;

pub use calendar::CalendarCollection;
pub use event::{CalendarEvent, EventIntent};
pub use pdate::{DateRange, ProviderDate, ProviderDateError};
pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
