//! Calendar handling: the daily range walker and epoch decomposition.
//!
//! Range bounds are wall-clock local date-times (`YYYY-MM-DD HH:MM:SS`). The walker
//! steps one calendar day at a time over `[start, end)` and stops once the remaining
//! duration is no longer positive.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Textual format of range bounds and decomposed timestamps.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of the day component in archive names.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("invalid date-time '{value}' (expected YYYY-MM-DD HH:MM:SS): {message}")]
    InvalidDateTime { value: String, message: String },

    #[error("invalid time zone '{0}' (expected local, UTC or +HH:MM)")]
    InvalidTimeZone(String),
}

/// Parse a range bound in `YYYY-MM-DD HH:MM:SS` form.
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, CalendarError> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT).map_err(|e| {
        CalendarError::InvalidDateTime {
            value: value.to_string(),
            message: e.to_string(),
        }
    })
}

/// Iterator over the calendar days of a half-open `[start, end)` range.
///
/// The cursor moves forward as soon as a day is yielded, so whatever the caller
/// does with that day, the next call always returns the following one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRange {
    cursor: NaiveDateTime,
    end: NaiveDateTime,
}

impl DailyRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { cursor: start, end }
    }

    /// Build a range from two `YYYY-MM-DD HH:MM:SS` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, CalendarError> {
        Ok(Self::new(parse_datetime(start)?, parse_datetime(end)?))
    }

    /// Number of days still to be visited.
    pub fn remaining(&self) -> usize {
        self.clone().count()
    }
}

impl Iterator for DailyRange {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.end.signed_duration_since(self.cursor) <= chrono::Duration::zero() {
            return None;
        }
        let day = self.cursor.date();
        // Past chrono's representable range the walk simply ends.
        self.cursor = match self.cursor.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => self.end,
        };
        Some(day)
    }
}

/// Zone used to render epoch seconds as calendar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeZoneSetting {
    /// The process's local zone.
    #[default]
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

/// Calendar breakdown of one epoch timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarFields {
    pub formatted: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl TimeZoneSetting {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Break `epoch` seconds down in this zone. `None` when out of range.
    pub fn breakdown(&self, epoch: i64) -> Option<CalendarFields> {
        let utc = DateTime::from_timestamp(epoch, 0)?;
        Some(match self {
            Self::Local => fields(&utc.with_timezone(&Local)),
            Self::Fixed(offset) => fields(&utc.with_timezone(offset)),
        })
    }
}

fn fields<Tz: TimeZone>(dt: &DateTime<Tz>) -> CalendarFields
where
    Tz::Offset: fmt::Display,
{
    CalendarFields {
        formatted: dt.format(DATETIME_FORMAT).to_string(),
        year: dt.year(),
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
    }
}

impl FromStr for TimeZoneSetting {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || CalendarError::InvalidTimeZone(s.to_string());

        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(Self::utc());
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = match rest.split_once(':') {
            Some((h, m)) => (h, m),
            None => (rest, "0"),
        };
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeZoneSetting {
    type Error = CalendarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeZoneSetting> for String {
    fn from(tz: TimeZoneSetting) -> Self {
        tz.to_string()
    }
}

impl fmt::Display for TimeZoneSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}
