use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Parses a backend timestamp, returning `None` for anything that is not a usable date.
pub fn parse_date_or_null(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight))
}

/// Whole days from `from` to `to`, rounded up. Negative when `to` is earlier.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds();
    let whole = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        whole
    } else {
        whole + 1
    }
}

pub fn relative_label(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match days_between(now, date) {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        -1 => "yesterday".to_string(),
        days if days > 0 => format!("in {days} days"),
        days => format!("{} days ago", -days),
    }
}

/// Phrase for a moment already behind `now`, counted in whole elapsed days.
pub fn elapsed_label(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match (now - date).num_days() {
        days if days <= 0 => "less than a day ago".to_string(),
        1 => "1 day ago".to_string(),
        days => format!("{days} days ago"),
    }
}

pub fn date_label(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn month_name(month: u32) -> Option<&'static str> {
    const MONTHS: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    let index = usize::try_from(month).ok()?.checked_sub(1)?;
    MONTHS.get(index).copied()
}
