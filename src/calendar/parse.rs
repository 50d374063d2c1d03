//! Feed parsing.
//!
//! Turns a raw iCalendar document into [`Event`]s. Every `VEVENT` record is
//! built on its own and either becomes an event or a [`Skipped`] entry, so a
//! single broken record never costs the rest of the feed.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use uuid::Uuid;

use crate::logger::fragment;

use super::audience::classify_event;
use super::event::{
    sanitize_line, sanitize_text, Event, EventStatus, CATEGORY_MAX_LEN, DESCRIPTION_MAX_LEN,
    LOCATION_MAX_LEN, TITLE_MAX_LEN,
};
use super::Window;

/// Length of events that come without DTEND and DURATION.
pub const DEFAULT_TIMED_DURATION: Duration = Duration::hours(1);

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<sign>[+-])?P(?:(?P<w>\d{1,6})W)?(?:(?P<d>\d{1,6})D)?(?:T(?:(?P<h>\d{1,6})H)?(?:(?P<m>\d{1,6})M)?(?:(?P<s>\d{1,8})S)?)?$")
        .expect("duration regex")
});

#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Zone for floating date-times and bare dates.
    pub timezone: Tz,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self { timezone: Tz::UTC }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing DTSTART")]
    MissingStart,
    #[error("unparseable {property} value '{value}'")]
    InvalidDate { property: &'static str, value: String },
    #[error("missing or empty SUMMARY")]
    EmptyTitle,
    #[error("end {end} is not after start {start}")]
    EndNotAfterStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("record is not terminated by END:VEVENT")]
    Unterminated,
}

/// A record that did not make it into the event list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// Logical line (after unfolding) of the record's `BEGIN:VEVENT`.
    pub line: usize,
    pub uid: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub events: Vec<Event>,
    pub skipped: Vec<Skipped>,
    /// Well-formed records that start outside the requested window.
    pub outside_window: usize,
}

/// One `NAME;PARAM=VALUE:value` content line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Property {
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl Property {
    fn parse(line: &str) -> Option<Self> {
        let mut in_quotes = false;
        let mut value_start = None;

        for (idx, c) in line.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                ':' if !in_quotes => {
                    value_start = Some(idx);
                    break;
                }
                _ => {}
            }
        }

        let (head, value) = line.split_at(value_start?);
        let mut parts = head.split(';');
        let name = parts.next()?.trim().to_ascii_uppercase();
        if name.is_empty() {
            return None;
        }

        let params = parts
            .filter_map(|param| param.split_once('='))
            .map(|(key, value)| (key.trim().to_ascii_uppercase(), value.trim_matches('"').to_owned()))
            .collect();

        Some(Self {
            name,
            params,
            value: value[1..].to_owned(),
        })
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct Record {
    line: usize,
    properties: Vec<Property>,
}

impl Record {
    fn new(line: usize) -> Self {
        Self {
            line,
            properties: Vec::new(),
        }
    }

    fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(|p| decode_text(&p.value))
    }

    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn uid(&self) -> Option<String> {
        self.get("UID")
            .map(|p| p.value.trim().to_owned())
            .filter(|uid| !uid.is_empty())
    }

    fn skipped(&self, reason: SkipReason) -> Skipped {
        Skipped {
            line: self.line,
            uid: self.uid(),
            reason,
        }
    }
}

/// Parses `raw` and returns the events whose start lies in `window`.
pub fn parse(raw: &str, window: &Window, options: &ParserOptions) -> ParseOutcome {
    let unfolded = icalendar::parser::unfold(raw);
    let mut outcome = ParseOutcome::default();

    let mut current: Option<Record> = None;
    // Depth of components nested inside the current record (VALARM, ...).
    let mut nested = 0usize;

    for (idx, line) in unfolded.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let Some(property) = Property::parse(line) else {
            if current.is_some() {
                log::debug!(component = "parser", line = idx + 1, fragment = fragment(line); "ignoring malformed content line");
            }
            continue;
        };

        match property.name.as_str() {
            "BEGIN" if property.value.trim().eq_ignore_ascii_case("VEVENT") => {
                if let Some(previous) = current.take() {
                    outcome.skipped.push(previous.skipped(SkipReason::Unterminated));
                }
                current = Some(Record::new(idx + 1));
                nested = 0;
            }
            "BEGIN" if current.is_some() => nested += 1,
            "END" if current.is_some() && nested > 0 => nested -= 1,
            "END" if property.value.trim().eq_ignore_ascii_case("VEVENT") => {
                if let Some(record) = current.take() {
                    match build(&record, options) {
                        Ok(event) if window.contains(event.start) => outcome.events.push(event),
                        Ok(_) => outcome.outside_window += 1,
                        Err(reason) => outcome.skipped.push(record.skipped(reason)),
                    }
                }
            }
            _ => {
                if let Some(record) = current.as_mut().filter(|_| nested == 0) {
                    record.properties.push(property);
                }
            }
        }
    }

    if let Some(record) = current.take() {
        outcome.skipped.push(record.skipped(SkipReason::Unterminated));
    }

    for skipped in &outcome.skipped {
        log::warn!(
            component = "parser",
            line = skipped.line,
            fragment = skipped.uid.as_deref().unwrap_or("<no uid>");
            "dropping record: {}", skipped.reason
        );
    }

    log::debug!(
        component = "parser";
        "parsed {} events, skipped {}, {} outside window",
        outcome.events.len(),
        outcome.skipped.len(),
        outcome.outside_window,
    );

    outcome
}

fn build(record: &Record, options: &ParserOptions) -> Result<Event, SkipReason> {
    let title = record
        .text("SUMMARY")
        .map(|title| sanitize_line(&title, TITLE_MAX_LEN))
        .filter(|title| !title.is_empty())
        .ok_or(SkipReason::EmptyTitle)?;

    let dtstart = record.get("DTSTART").ok_or(SkipReason::MissingStart)?;
    let (start, all_day) =
        parse_date_time(dtstart, options.timezone).ok_or_else(|| SkipReason::InvalidDate {
            property: "DTSTART",
            value: dtstart.value.clone(),
        })?;

    let end = match (record.get("DTEND"), record.get("DURATION")) {
        (Some(dtend), _) => {
            parse_date_time(dtend, options.timezone)
                .ok_or_else(|| SkipReason::InvalidDate {
                    property: "DTEND",
                    value: dtend.value.clone(),
                })?
                .0
        }
        (None, Some(duration)) => parse_duration(&duration.value)
            .and_then(|span| start.checked_add_signed(span))
            .ok_or_else(|| SkipReason::InvalidDate {
                property: "DURATION",
                value: duration.value.clone(),
            })?,
        (None, None) if all_day => start + Duration::days(1),
        (None, None) => start + DEFAULT_TIMED_DURATION,
    };

    if end <= start {
        return Err(SkipReason::EndNotAfterStart { start, end });
    }

    let description = record
        .text("DESCRIPTION")
        .map(|text| sanitize_text(&text, DESCRIPTION_MAX_LEN))
        .unwrap_or_default();

    let location = record
        .text("LOCATION")
        .map(|text| sanitize_line(&text, LOCATION_MAX_LEN))
        .unwrap_or_default();

    let status = record
        .get("STATUS")
        .map_or(EventStatus::Tentative, |p| EventStatus::from_ical(&p.value));

    let categories = record
        .properties
        .iter()
        .filter(|p| p.name == "CATEGORIES")
        .flat_map(|p| split_escaped(&p.value, ','))
        .map(|category| sanitize_line(&decode_text(&category), CATEGORY_MAX_LEN))
        .filter(|category| !category.is_empty())
        .collect();

    let registration_url = record
        .get("URL")
        .and_then(|p| Url::parse(p.value.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"));

    let id = record.uid().unwrap_or_else(|| {
        let seed = format!("{title}\u{1f}{}", dtstart.value.trim());
        Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
    });

    let audience = classify_event(&title, &description);

    Ok(Event {
        id,
        title,
        description,
        location,
        start,
        end,
        status,
        all_day,
        recurring: record.has("RRULE") || record.has("RDATE") || record.has("RECURRENCE-ID"),
        categories,
        registration_url,
        audience,
    })
}

/// Parses `YYYYMMDDTHHMMSS[Z]` and bare `YYYYMMDD` values. The flag is set for
/// bare dates, which start at midnight.
fn parse_date_time(property: &Property, timezone: Tz) -> Option<(DateTime<Utc>, bool)> {
    let value = property.value.trim();

    let zone = match property.param("TZID") {
        Some(tzid) => Tz::from_str(tzid).unwrap_or_else(|_| {
            log::debug!(component = "parser", fragment = tzid; "unknown TZID, using {timezone}");
            timezone
        }),
        None => timezone,
    };

    let is_date = property
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()));

    if is_date {
        let date = NaiveDate::parse_from_str(value.get(..8)?, "%Y%m%d").ok()?;
        return localize(date.and_time(NaiveTime::MIN), zone).map(|start| (start, true));
    }

    if let Some(utc) = value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        return parse_naive(utc).map(|naive| (naive.and_utc(), false));
    }

    localize(parse_naive(value)?, zone).map(|start| (start, false))
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M"))
        .ok()
}

fn localize(naive: NaiveDateTime, zone: Tz) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Parses an RFC 5545 duration such as `PT1H30M` or `P1D`.
fn parse_duration(value: &str) -> Option<Duration> {
    let captures = DURATION.captures(value.trim())?;
    let part = |name: &str| -> i64 {
        captures
            .name(name)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    let duration = Duration::weeks(part("w"))
        + Duration::days(part("d"))
        + Duration::hours(part("h"))
        + Duration::minutes(part("m"))
        + Duration::seconds(part("s"));

    match captures.name("sign").map(|m| m.as_str()) {
        Some("-") => Some(-duration),
        _ => Some(duration),
    }
}

/// Decodes the text escapes `\n`, `\N`, `\,`, `\;` and `\\`.
pub fn decode_text(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }

        match chars.next() {
            Some('n' | 'N') => decoded.push('\n'),
            Some(escaped @ (',' | ';' | '\\' | ':' | '"')) => decoded.push(escaped),
            Some(other) => {
                decoded.push('\\');
                decoded.push(other);
            }
            None => decoded.push('\\'),
        }
    }

    decoded
}

/// Splits on `delimiter` unless it is escaped. Escapes are kept for
/// [`decode_text`].
fn split_escaped(value: &str, delimiter: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut escaped = false;

    for c in value.chars() {
        let last = parts.last_mut().expect("parts is never empty");

        if escaped {
            last.push(c);
            escaped = false;
        } else if c == '\\' {
            last.push(c);
            escaped = true;
        } else if c == delimiter {
            parts.push(String::new());
        } else {
            last.push(c);
        }
    }

    parts
}
