//! Provider timestamps carry no offset; they are Central European wall-clock
//! time (CET, UTC+1, or CEST, UTC+2, under EU summer-time rules).
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

const PROVIDER_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Last Sunday of the given month.
fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.pred_opt()?;
    let back = last.weekday().num_days_from_sunday();
    Some(last - Duration::days(i64::from(back)))
}

/// Summer time runs from 01:00 UTC on the last Sunday of March until 01:00 UTC
/// on the last Sunday of October.
pub fn is_summer_time(instant: DateTime<Utc>) -> bool {
    let year = instant.year();
    let bounds = last_sunday(year, 3)
        .and_then(|d| d.and_hms_opt(1, 0, 0))
        .zip(last_sunday(year, 10).and_then(|d| d.and_hms_opt(1, 0, 0)));
    match bounds {
        Some((start, end)) => instant >= start.and_utc() && instant < end.and_utc(),
        None => false,
    }
}

/// UTC offset in hours of Central European time at `instant`.
pub fn offset_hours(instant: DateTime<Utc>) -> i64 {
    if is_summer_time(instant) {
        2
    } else {
        1
    }
}

/// Parse a `yyyyMMdd'T'HHmmss` provider timestamp as CET/CEST wall-clock time.
/// Wall-clock times that repeat when summer time ends resolve to the summer
/// reading; times skipped when it starts resolve as CET.
pub fn parse_provider_time(raw: &str) -> Option<DateTime<Utc>> {
    let local = NaiveDateTime::parse_from_str(raw.trim(), PROVIDER_FORMAT).ok()?;
    Some(from_wall_clock(local))
}

/// Schedule dates come either as full provider timestamps or as bare days
/// (`yyyyMMdd` or `yyyy-MM-dd`). A bare day resolves to its first second, or
/// its last one when `end_of_day` is set.
pub fn parse_provider_day(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Some(instant) = parse_provider_time(raw) {
        return Some(instant);
    }
    let raw = raw.trim();
    let day = NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()?;
    let local = if end_of_day {
        day.and_hms_opt(23, 59, 59)?
    } else {
        day.and_hms_opt(0, 0, 0)?
    };
    Some(from_wall_clock(local))
}

fn from_wall_clock(local: NaiveDateTime) -> DateTime<Utc> {
    let as_summer = (local - Duration::hours(2)).and_utc();
    if is_summer_time(as_summer) {
        return as_summer;
    }
    (local - Duration::hours(1)).and_utc()
}

/// Wall-clock rendering in provider-local time, e.g. `08:30`.
pub fn local_clock(instant: DateTime<Utc>) -> String {
    (instant + Duration::hours(offset_hours(instant)))
        .format("%H:%M")
        .to_string()
}
