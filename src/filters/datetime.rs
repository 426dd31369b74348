//! Date parsing, Django-style date formatting and elapsed-time phrases.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{error, warn};

use crate::data::{self, ValueType};

/// Which directive language a format string is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// Single-letter directives (`D, j M Y`).
    Django,
    /// `strftime` directives (`%a, %-d %b %Y`), passed through.
    Python,
}

impl DateStyle {
    /// Anything other than `python` reads as Django.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("python") {
            DateStyle::Python
        } else {
            DateStyle::Django
        }
    }
}

const ZONED_FORMATS: &[&str] = &["%d-%b-%Y %H:%M:%S%.f%:z", "%d-%b-%Y %H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%:z"];
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%d-%b-%Y %H:%M:%S%.f"];
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %B, %Y", "%d %B %Y", "%B %d, %Y", "%d-%b-%Y"];

/// Reads a date/time string. Values without an offset are taken as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt);
    }
    if let Some(dt) = ZONED_FORMATS.iter().find_map(|f| DateTime::parse_from_str(text, f).ok()) {
        return Some(dt);
    }
    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(Utc.from_utc_datetime(&naive).fixed_offset())
}

fn django_directive(c: char) -> Option<&'static str> {
    let directive = match c {
        'd' => "%d",
        'j' => "%-d",
        'D' => "%a",
        'l' => "%A",
        'w' => "%w",
        'z' => "%-j",
        'W' => "%V",
        'm' => "%m",
        'n' => "%-m",
        'M' => "%b",
        'E' | 'F' => "%B",
        'y' => "%y",
        'Y' => "%Y",
        'o' => "%G",
        'g' => "%-I",
        'G' => "%-H",
        'h' => "%I",
        'H' => "%H",
        'i' => "%M",
        's' => "%S",
        'u' => "%6f",
        'A' => "%p",
        'e' => "%Z",
        'O' => "%z",
        'c' => "%+",
        'r' => "%a, %d %b %Y %H:%M:%S %z",
        'U' => "%s",
        'I' | 'T' | 'Z' => "",
        _ => return None,
    };
    Some(directive)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Rewrites a format string into `strftime` directives.
fn to_strftime(format: &str, style: DateStyle) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars();
    match style {
        DateStyle::Django => {
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        push_literal(&mut out, escaped);
                    }
                    continue;
                }
                match django_directive(c) {
                    Some(directive) => out.push_str(directive),
                    None => push_literal(&mut out, c),
                }
            }
        }
        DateStyle::Python => {
            // Python's %f is microseconds, chrono's is nanoseconds.
            while let Some(c) = chars.next() {
                out.push(c);
                if c != '%' {
                    continue;
                }
                match chars.next() {
                    Some('f') => out.push_str("6f"),
                    Some(next) => out.push(next),
                    None => {}
                }
            }
        }
    }
    out
}

/// Formats `dt`; `None` when the format holds a directive chrono cannot render.
pub fn format_datetime(dt: &DateTime<FixedOffset>, format: &str, style: DateStyle) -> Option<String> {
    let strftime = to_strftime(format, style);
    let items: Vec<Item<'_>> = StrftimeItems::new(&strftime).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        error!(format = %strftime, "unsupported date directive");
        return None;
    }
    let mut out = String::new();
    if write!(out, "{}", dt.format_with_items(items.into_iter())).is_err() {
        error!(format = %strftime, "date could not be formatted");
        return None;
    }
    Some(out)
}

fn parse_value(filter: &'static str, value: &Value) -> Option<DateTime<FixedOffset>> {
    let Value::String(text) = value else {
        warn!(filter, found = %ValueType::of(value), "filter cannot use a value of this type");
        return None;
    };
    let parsed = parse_datetime(text);
    if parsed.is_none() {
        warn!(filter, value = %text, "not a recognisable date");
    }
    parsed
}

/// Shared body of `date` and `time`.
pub(super) fn date(filter: &'static str, value: &Value, format: &Value, style: &Value) -> Value {
    let Some(dt) = parse_value(filter, value) else {
        return Value::Null;
    };
    let style = DateStyle::from_name(&data::display(style));
    format_datetime(&dt, &data::display(format), style).map_or(Value::Null, Value::String)
}

/// Reference point for `timesince`/`timeuntil`; an empty argument means now.
fn reference(filter: &'static str, compare: &Value) -> Option<DateTime<FixedOffset>> {
    match compare {
        Value::String(s) if s.trim().is_empty() => Some(Utc::now().fixed_offset()),
        Value::Null => Some(Utc::now().fixed_offset()),
        other => parse_value(filter, other),
    }
}

const CHUNKS: &[(i64, &str)] = &[
    (60 * 60 * 24 * 365, "year"),
    (60 * 60 * 24 * 30, "month"),
    (60 * 60 * 24 * 7, "week"),
    (60 * 60 * 24, "day"),
    (60 * 60, "hour"),
    (60, "minute"),
];

fn unit(count: i64, name: &str) -> String {
    if count == 1 {
        format!("{} {}", count, name)
    } else {
        format!("{} {}s", count, name)
    }
}

/// Up to two adjacent units, largest first: `4 days, 6 hours`.
fn elapsed(seconds: i64) -> String {
    if seconds <= 0 {
        return unit(0, "minute");
    }
    let Some(index) = CHUNKS.iter().position(|(size, _)| seconds / size != 0) else {
        return unit(0, "minute");
    };
    let (size, name) = CHUNKS[index];
    let count = seconds / size;
    let mut out = unit(count, name);
    if let Some((next_size, next_name)) = CHUNKS.get(index + 1) {
        let next = (seconds - size * count) / next_size;
        if next != 0 {
            out.push_str(", ");
            out.push_str(&unit(next, next_name));
        }
    }
    out
}

pub(super) fn time_since(value: &Value, compare: &Value) -> Value {
    let (Some(then), Some(now)) = (parse_value("timesince", value), reference("timesince", compare)) else {
        return Value::Null;
    };
    Value::String(elapsed((now - then).num_seconds()))
}

pub(super) fn time_until(value: &Value, compare: &Value) -> Value {
    let (Some(then), Some(now)) = (parse_value("timeuntil", value), reference("timeuntil", compare)) else {
        return Value::Null;
    };
    Value::String(elapsed((then - now).num_seconds()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STAMP: &str = "07-Jan-2021 09:50:07.586525+03:00";

    #[test]
    fn django_directives() {
        let out = date("date", &json!(STAMP), &json!("D, j M Y H:i:s O"), &json!("django"));
        assert_eq!(out, json!("Thu, 7 Jan 2021 09:50:07 +0300"));
    }

    #[test]
    fn python_directives_pass_through() {
        let out = date("date", &json!(STAMP), &json!("%A, %-d %B %Y %-I.%M%p"), &json!("python"));
        assert_eq!(out, json!("Thursday, 7 January 2021 9.50AM"));
    }

    #[test]
    fn microseconds_in_both_styles() {
        let dt = parse_datetime(STAMP).unwrap();
        assert_eq!(format_datetime(&dt, "s.u", DateStyle::Django).as_deref(), Some("07.586525"));
        assert_eq!(format_datetime(&dt, "%S.%f", DateStyle::Python).as_deref(), Some("07.586525"));
    }

    #[test]
    fn escapes_and_literals() {
        let dt = parse_datetime("2015-03-21").unwrap();
        assert_eq!(format_datetime(&dt, "\\Y Y", DateStyle::Django).as_deref(), Some("Y 2015"));
        assert_eq!(format_datetime(&dt, "100% n/j", DateStyle::Django).as_deref(), Some("100% 3/21"));
    }

    #[test]
    fn naive_forms_are_utc() {
        let dt = parse_datetime("21 March, 2015").unwrap();
        assert_eq!(format_datetime(&dt, "Y-m-d H:i O", DateStyle::Django).as_deref(), Some("2015-03-21 00:00 +0000"));
        assert!(parse_datetime("2015-03-21 14:05:00").is_some());
        assert!(parse_datetime("last tuesday").is_none());
    }

    #[test]
    fn time_defaults_to_hours_and_minutes() {
        assert_eq!(date("time", &json!(STAMP), &json!("H:i"), &json!("django")), json!("09:50"));
    }

    #[test]
    fn bad_values_give_null() {
        assert_eq!(date("date", &json!("nope"), &json!("Y"), &json!("django")), Value::Null);
        assert_eq!(date("date", &json!(12), &json!("Y"), &json!("django")), Value::Null);
        assert_eq!(date("date", &json!(STAMP), &json!("%Q"), &json!("python")), Value::Null);
    }

    #[test]
    fn elapsed_time_phrases() {
        let since = time_since(&json!("2021-01-01"), &json!("2021-01-05 06:00:00"));
        assert_eq!(since, json!("4 days, 6 hours"));
        let until = time_until(&json!("2021-01-05 06:00:00"), &json!("2021-01-01"));
        assert_eq!(until, json!("4 days, 6 hours"));
        let reversed = time_since(&json!("2021-01-05"), &json!("2021-01-01"));
        assert_eq!(reversed, json!("0 minutes"));
        assert_eq!(elapsed(60 * 60 * 24 * 365 + 60), "1 year");
        assert_eq!(elapsed(60 * 61), "1 hour, 1 minute");
    }
}
