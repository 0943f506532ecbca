//! Timezone-aware display formatting.
//!
//! Timestamps are stored in UTC and rendered in the profile's IANA zone.
//! An unknown zone name renders in UTC.

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;

/// Resolve an IANA zone name, falling back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("Unknown timezone {:?}, using UTC", name);
            Tz::UTC
        }
    }
}

/// Calendar date of `ts` in `tz`.
pub fn local_date(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// "Mar 1, 2024"
pub fn format_date(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%b %-d, %Y").to_string()
}

/// "8:05 AM"
pub fn format_time(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%-I:%M %p").to_string()
}

/// "Mar 1, 2024 8:05 AM"
pub fn format_date_time(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%b %-d, %Y %-I:%M %p").to_string()
}

/// "Today", "Yesterday", or the formatted date, judged in `tz`.
pub fn relative_day(ts: DateTime<Utc>, now: DateTime<Utc>, tz: Tz) -> String {
    let day = local_date(ts, tz);
    let today = local_date(now, tz);
    if day == today {
        "Today".to_string()
    } else if today.checked_sub_days(Days::new(1)) == Some(day) {
        "Yesterday".to_string()
    } else {
        format_date(ts, tz)
    }
}
