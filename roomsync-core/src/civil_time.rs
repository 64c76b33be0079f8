//! Conversions between absolute instants and local civil time.
//!
//! Bookings are stored in UTC but every tariff band is defined on local
//! hours, so anything that looks at an hour or a date goes through here.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday,
};

use crate::constants::LOCAL_UTC_OFFSET_SECS;

pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_UTC_OFFSET_SECS).expect("offset is within one day")
}

pub fn to_local(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&local_offset())
}

pub fn local_hour(instant: DateTime<Utc>) -> u32 {
    to_local(instant).hour()
}

pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    to_local(instant).date_naive()
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Midnight at the start of `date` in local time, as a UTC instant.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    local_offset()
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// `[Jan 1 local, Jan 1 of next year local)` as UTC instants.
pub fn local_year_bounds(year: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default();
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap_or_default();
    (local_midnight(start), local_midnight(end))
}
