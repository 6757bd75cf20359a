use crate::models::{DateFormat, TimeFormat};
use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Timelike, Utc,
};

pub const SECOND_MS: i64 = 1_000;
pub const MINUTE_MS: i64 = 60 * SECOND_MS;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn to_local(timestamp: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .unwrap_or_default()
        .with_timezone(&Local)
}

pub fn local_date(timestamp: i64) -> NaiveDate {
    to_local(timestamp).date_naive()
}

/// Converts a local wall-clock instant to epoch millis. Instants skipped by a
/// DST gap resolve to the first valid instant after them.
pub fn local_millis(datetime: NaiveDateTime) -> i64 {
    match Local.from_local_datetime(&datetime) {
        LocalResult::Single(value) => value.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => Local
            .from_local_datetime(&(datetime + Duration::hours(1)))
            .earliest()
            .map(|value| value.timestamp_millis())
            .unwrap_or_else(|| datetime.and_utc().timestamp_millis()),
    }
}

/// Half-open bounds `[start, end)` of a local calendar day.
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = local_millis(date.and_time(NaiveTime::MIN));
    let end = date
        .succ_opt()
        .map(|next| local_millis(next.and_time(NaiveTime::MIN)))
        .unwrap_or(start + DAY_MS);
    (start, end)
}

pub fn start_of_day(timestamp: i64) -> i64 {
    day_bounds(local_date(timestamp)).0
}

pub fn end_of_day(timestamp: i64) -> i64 {
    day_bounds(local_date(timestamp)).1 - 1
}

pub fn start_of_week(timestamp: i64) -> i64 {
    let date = local_date(timestamp);
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    day_bounds(monday).0
}

pub fn end_of_week(timestamp: i64) -> i64 {
    let date = local_date(timestamp);
    let sunday = date + Duration::days(i64::from(6 - date.weekday().num_days_from_monday()));
    day_bounds(sunday).1 - 1
}

pub fn start_of_month(timestamp: i64) -> i64 {
    let date = local_date(timestamp);
    let first = date.with_day(1).unwrap_or(date);
    day_bounds(first).0
}

pub fn end_of_month(timestamp: i64) -> i64 {
    let date = local_date(timestamp);
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|next_month| day_bounds(next_month).0 - 1)
        .unwrap_or_else(|| end_of_day(timestamp))
}

pub fn is_same_day(left: i64, right: i64) -> bool {
    local_date(left) == local_date(right)
}

pub fn days_between(start: i64, end: i64) -> i64 {
    (local_date(end) - local_date(start)).num_days()
}

pub fn hour_of_day(timestamp: i64) -> u32 {
    to_local(timestamp).hour()
}

/// `H:MM:SS` from one hour upwards, `MM:SS` below.
pub fn format_duration(duration_ms: i64) -> String {
    let total_seconds = duration_ms.max(0) / SECOND_MS;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

pub fn format_duration_long(duration_ms: i64) -> String {
    let safe = duration_ms.max(0);
    let hours = safe / HOUR_MS;
    let minutes = (safe % HOUR_MS) / MINUTE_MS;

    if hours > 0 {
        if minutes > 0 {
            format!("{hours} hr {minutes} min")
        } else {
            format!("{hours} hr")
        }
    } else if minutes > 0 {
        format!("{minutes} min")
    } else {
        "< 1 min".to_string()
    }
}

pub fn format_date(timestamp: i64, format: DateFormat) -> String {
    let pattern = match format {
        DateFormat::Iso => "%Y-%m-%d",
        DateFormat::Us => "%m/%d/%Y",
        DateFormat::Eu => "%d/%m/%Y",
    };
    to_local(timestamp).format(pattern).to_string()
}

pub fn format_time(timestamp: i64, format: TimeFormat) -> String {
    let pattern = match format {
        TimeFormat::Hours12 => "%I:%M %p",
        TimeFormat::Hours24 => "%H:%M",
    };
    to_local(timestamp).format(pattern).to_string()
}

pub fn parse_local_datetime(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M")
        .ok()
        .map(local_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_short_and_long_durations() {
        assert_eq!(format_duration(65 * SECOND_MS), "01:05");
        assert_eq!(format_duration(HOUR_MS + 2 * MINUTE_MS + 3 * SECOND_MS), "1:02:03");
        assert_eq!(format_duration_long(30 * SECOND_MS), "< 1 min");
        assert_eq!(format_duration_long(45 * MINUTE_MS), "45 min");
        assert_eq!(format_duration_long(2 * HOUR_MS + 5 * MINUTE_MS), "2 hr 5 min");
        assert_eq!(format_duration_long(2 * HOUR_MS), "2 hr");
    }

    #[test]
    fn day_boundaries_contain_the_timestamp() {
        let now = now_millis();
        let start = start_of_day(now);
        let end = end_of_day(now);

        assert!(start <= now && now <= end);
        assert!(is_same_day(start, end));
        assert!(!is_same_day(start, end + 1));
        assert_eq!(days_between(start, end + 1), 1);
    }

    #[test]
    fn week_and_month_bounds_enclose_day() {
        let now = now_millis();

        assert!(start_of_week(now) <= start_of_day(now));
        assert!(end_of_week(now) >= end_of_day(now));
        assert_eq!(local_date(start_of_month(now)).day(), 1);
        assert!(end_of_month(now) >= end_of_day(now));
        assert_eq!(local_date(start_of_week(now)).weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn parses_local_datetime_input() {
        let parsed = parse_local_datetime("2026-02-18 09:30").expect("parsed");
        assert_eq!(to_local(parsed).hour(), 9);
        assert_eq!(to_local(parsed).minute(), 30);
        assert!(parse_local_datetime("18/02/2026").is_none());
    }
}
