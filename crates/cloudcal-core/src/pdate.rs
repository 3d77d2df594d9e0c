//! The provider's dense date encoding.
//!
//! The calendar service represents every date as a 7-element integer array:
//! `[yyyymmdd, year, month, day, hour, minute, offsetMinutes]`. The first
//! element redundantly encodes the date as a sortable stamp; the last is the
//! UTC offset of the wall-clock fields in minutes. [`ProviderDate`] is the
//! typed form of that array and refuses to decode malformed ones.

use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while decoding or converting a provider date.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderDateError {
    /// The wire array did not have exactly 7 elements.
    #[error("provider date array must have 7 elements, got {0}")]
    Length(usize),
    /// A field was outside its calendar range.
    #[error("provider date {field} out of range: {value}")]
    Range { field: &'static str, value: i64 },
    /// The redundant yyyymmdd stamp disagreed with the date fields.
    #[error("provider date stamp {stamp} does not match {year:04}-{month:02}-{day:02}")]
    Stamp {
        stamp: i64,
        year: i32,
        month: u32,
        day: u32,
    },
    /// The UTC offset could not be represented.
    #[error("provider date offset out of range: {0} minutes")]
    Offset(i32),
    /// The fields do not name a real calendar instant.
    #[error("provider date {year:04}-{month:02}-{day:02} {hour:02}:{minute:02} is not a valid instant")]
    Invalid {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    },
    /// A range was constructed with end before start.
    #[error("date range end precedes start")]
    Inverted,
}

/// A calendar instant in the provider's wire encoding.
///
/// Ordering is calendar order: comparing two values is equivalent to
/// comparing their wire arrays lexicographically, which is what the
/// service's own range queries assume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<i64>", into = "Vec<i64>")]
pub struct ProviderDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// Offset of the wall-clock fields from UTC, in minutes.
    pub offset_minutes: i32,
}

impl ProviderDate {
    /// Creates a date from explicit fields, validating calendar ranges.
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        offset_minutes: i32,
    ) -> Result<Self, ProviderDateError> {
        let date = Self {
            year,
            month,
            day,
            hour,
            minute,
            offset_minutes,
        };
        date.validate()?;
        Ok(date)
    }

    /// Creates a date from a zoned datetime, keeping its wall-clock fields
    /// and UTC offset.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            offset_minutes: dt.offset().fix().local_minus_utc() / 60,
        }
    }

    /// The redundant sortable stamp, `year * 10000 + month * 100 + day`.
    pub fn date_stamp(&self) -> i64 {
        i64::from(self.year) * 10_000 + i64::from(self.month) * 100 + i64::from(self.day)
    }

    /// Formats the date portion the way range queries expect (`YYYY-MM-DD`).
    pub fn to_query_date(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// Converts to a UTC instant.
    pub fn to_utc(&self) -> Result<DateTime<Utc>, ProviderDateError> {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)
            .ok_or(ProviderDateError::Offset(self.offset_minutes))?;
        offset
            .with_ymd_and_hms(self.year, self.month, self.day, self.hour, self.minute, 0)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(ProviderDateError::Invalid {
                year: self.year,
                month: self.month,
                day: self.day,
                hour: self.hour,
                minute: self.minute,
            })
    }

    /// Whole minutes from `self` to `other` (negative when `other` is
    /// earlier).
    pub fn minutes_until(&self, other: &ProviderDate) -> Result<i64, ProviderDateError> {
        let from = self.to_utc()?;
        let to = other.to_utc()?;
        Ok((to - from).num_minutes())
    }

    fn validate(&self) -> Result<(), ProviderDateError> {
        if !(1..=12).contains(&self.month) {
            return Err(ProviderDateError::Range {
                field: "month",
                value: i64::from(self.month),
            });
        }
        if !(1..=31).contains(&self.day) {
            return Err(ProviderDateError::Range {
                field: "day",
                value: i64::from(self.day),
            });
        }
        if self.hour > 23 {
            return Err(ProviderDateError::Range {
                field: "hour",
                value: i64::from(self.hour),
            });
        }
        if self.minute > 59 {
            return Err(ProviderDateError::Range {
                field: "minute",
                value: i64::from(self.minute),
            });
        }
        if self.offset_minutes.abs() >= 24 * 60 {
            return Err(ProviderDateError::Offset(self.offset_minutes));
        }
        Ok(())
    }
}

impl TryFrom<Vec<i64>> for ProviderDate {
    type Error = ProviderDateError;

    fn try_from(raw: Vec<i64>) -> Result<Self, Self::Error> {
        if raw.len() != 7 {
            return Err(ProviderDateError::Length(raw.len()));
        }
        let field = |idx: usize, name: &'static str| -> Result<i64, ProviderDateError> {
            let value = raw[idx];
            if !(i64::from(i32::MIN)..=i64::from(i32::MAX)).contains(&value) {
                return Err(ProviderDateError::Range { field: name, value });
            }
            Ok(value)
        };
        let stamp = raw[0];
        let date = Self {
            year: field(1, "year")? as i32,
            month: field(2, "month")? as u32,
            day: field(3, "day")? as u32,
            hour: field(4, "hour")? as u32,
            minute: field(5, "minute")? as u32,
            offset_minutes: field(6, "offsetMinutes")? as i32,
        };
        date.validate()?;
        if stamp != date.date_stamp() {
            return Err(ProviderDateError::Stamp {
                stamp,
                year: date.year,
                month: date.month,
                day: date.day,
            });
        }
        Ok(date)
    }
}

impl From<ProviderDate> for Vec<i64> {
    fn from(date: ProviderDate) -> Self {
        vec![
            date.date_stamp(),
            i64::from(date.year),
            i64::from(date.month),
            i64::from(date.day),
            i64::from(date.hour),
            i64::from(date.minute),
            i64::from(date.offset_minutes),
        ]
    }
}

/// An inclusive date range for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start of the range (inclusive).
    pub start: ProviderDate,
    /// End of the range (inclusive).
    pub end: ProviderDate,
}

impl DateRange {
    /// Creates a range, refusing one whose end precedes its start.
    pub fn new(start: ProviderDate, end: ProviderDate) -> Result<Self, ProviderDateError> {
        if end < start {
            return Err(ProviderDateError::Inverted);
        }
        Ok(Self { start, end })
    }

    /// The calendar month containing `date`, from its first day to the
    /// first day of the next month.
    pub fn month_of(date: &ProviderDate) -> Self {
        let start = ProviderDate {
            year: date.year,
            month: date.month,
            day: 1,
            hour: 0,
            minute: 0,
            offset_minutes: date.offset_minutes,
        };
        let (end_year, end_month) = if date.month == 12 {
            (date.year + 1, 1)
        } else {
            (date.year, date.month + 1)
        };
        let end = ProviderDate {
            year: end_year,
            month: end_month,
            day: 1,
            hour: 0,
            minute: 0,
            offset_minutes: date.offset_minutes,
        };
        Self { start, end }
    }
}
