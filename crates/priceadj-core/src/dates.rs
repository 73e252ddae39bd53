//! Calendar-date handling for a scheduler hosted far from the business.
//!
//! Instants captured by the store are shifted +12h before the date is taken,
//! and the business "today" is the clock shifted +18h. Both offsets are fixed
//! constants, not timezone conversions.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

const CAPTURE_OFFSET_HOURS: i64 = 12;
const BUSINESS_DAY_OFFSET_HOURS: i64 = 18;

/// Reinterpret a stored instant as a calendar date.
#[must_use]
pub fn normalize_to_calendar_date(instant: DateTime<Utc>) -> NaiveDate {
    (instant + Duration::hours(CAPTURE_OFFSET_HOURS)).date_naive()
}

/// The business calendar date as seen from the scheduler's clock.
#[must_use]
pub fn business_today(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::hours(BUSINESS_DAY_OFFSET_HOURS)).date_naive()
}

/// Midnight UTC of a calendar date, the form dates are stored in.
#[must_use]
pub fn date_as_instant(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// `D/M/YYYY` without zero padding.
#[must_use]
pub fn format_dmy(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.day(), date.month(), date.year())
}

/// `YYYY-M-D` without zero padding, used in attachment file names.
#[must_use]
pub fn format_ymd_unpadded(date: NaiveDate) -> String {
    format!("{}-{}-{}", date.year(), date.month(), date.day())
}
