//! Due date canonicalization.
//!
//! The planner and the database disagree on how "due at end of day" is
//! stored. Both sides are reduced to the same canonical form before they
//! are compared:
//!
//! - a time of `HH:59:59` or `HH:59:00` (UTC) is a whole-day deadline and
//!   becomes a bare `YYYY-MM-DD`; before noon UTC the instant has rolled
//!   into the next day, so the previous date is used;
//! - any other time becomes `YYYY-MM-DDTHH:MM:SSZ`, truncated to seconds;
//! - empty or unparsable input becomes the empty string.

use crate::error::AppError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, TimeDelta, Timelike, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";
const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A due date in comparable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalDue {
    /// No due date.
    Unset,
    /// A whole-day deadline.
    Day(NaiveDate),
    /// A deadline at a specific time, whole seconds only.
    At(DateTime<Utc>),
}

impl CanonicalDue {
    /// Canonicalize a timestamp string.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Self::Unset;
        }

        match parse_instant(input) {
            Some(instant) => Self::from_instant(instant),
            None => match NaiveDate::parse_from_str(input, DATE_FORMAT) {
                Ok(date) => Self::Day(date),
                Err(_) => Self::Unset,
            },
        }
    }

    /// Canonicalize an instant.
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        let is_end_of_day = instant.minute() == 59 && matches!(instant.second(), 0 | 59);
        if !is_end_of_day {
            return Self::At(instant.trunc_subsecs(0));
        }

        let date = instant.date_naive();
        if instant.hour() < 12 {
            Self::Day(date.pred_opt().unwrap_or(date))
        } else {
            Self::Day(date)
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl std::fmt::Display for CanonicalDue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => Ok(()),
            Self::Day(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            Self::At(instant) => write!(f, "{}", instant.format(INSTANT_FORMAT)),
        }
    }
}

/// Parse an RFC 3339 timestamp, or an offset-less date-time taken as UTC.
fn parse_instant(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Canonical string form of a due date; empty means "no due date".
pub fn normalize(input: &str) -> String {
    CanonicalDue::parse(input).to_string()
}

/// [`normalize`] for optional values.
pub fn normalize_opt(input: Option<&str>) -> String {
    input.map(normalize).unwrap_or_default()
}

/// Move an instant by a signed number of whole days.
pub fn shift_days(instant: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, AppError> {
    TimeDelta::try_days(days)
        .and_then(|delta| instant.checked_add_signed(delta))
        .ok_or_else(|| {
            AppError::config_field(
                format!("a window of {} days is out of range", days),
                "days_to_fetch",
            )
        })
}
