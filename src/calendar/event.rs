use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Audience;

pub const TITLE_MAX_LEN: usize = 200;
pub const LOCATION_MAX_LEN: usize = 200;
pub const DESCRIPTION_MAX_LEN: usize = 2000;
pub const CATEGORY_MAX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Cancelled,
    Tentative,
}

impl EventStatus {
    /// Anything that is not a known status reads as tentative.
    pub fn from_ical(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Self::Confirmed,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Tentative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: EventStatus,
    pub all_day: bool,
    pub recurring: bool,
    pub categories: Vec<String>,
    pub registration_url: Option<Url>,
    pub audience: Audience,
}

impl Event {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// `[start, end)`: an event is no longer running at its end instant.
    pub fn is_running_at(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn starts_after(&self, at: DateTime<Utc>) -> bool {
        self.start > at
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }
}

/// Removes markup from feed text: tags are dropped, stray angle brackets and
/// control characters removed, and the result cut to `max_len` characters.
pub fn sanitize_text(input: &str, max_len: usize) -> String {
    let stripped = super::MARKUP.replace_all(input, "");

    let cleaned: String = stripped
        .chars()
        .filter(|c| !matches!(c, '<' | '>'))
        .filter(|c| *c == '\n' || !c.is_control())
        .collect();

    truncate(cleaned.trim(), max_len)
}

/// Like [`sanitize_text`], but collapses all whitespace into single spaces.
pub fn sanitize_line(input: &str, max_len: usize) -> String {
    let text = sanitize_text(input, usize::MAX);

    truncate(&text.split_whitespace().collect::<Vec<_>>().join(" "), max_len)
}

fn truncate(input: &str, max_len: usize) -> String {
    match input.char_indices().nth(max_len) {
        Some((idx, _)) => input[..idx].trim_end().to_owned(),
        None => input.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn status_defaults_to_tentative() {
        assert_eq!(EventStatus::from_ical("CONFIRMED"), EventStatus::Confirmed);
        assert_eq!(EventStatus::from_ical("cancelled"), EventStatus::Cancelled);
        assert_eq!(EventStatus::from_ical(""), EventStatus::Tentative);
        assert_eq!(EventStatus::from_ical("C0NFIRMED"), EventStatus::Tentative);
    }

    #[test]
    fn markup_is_stripped() {
        assert_eq!(
            sanitize_text("<b>Story</b> time <script>x</script>", 100),
            "Story time x"
        );
        assert_eq!(sanitize_text("a < b > c", 100), "a  b  c");
        assert_eq!(sanitize_line("  Lego\n  Club\t", 100), "Lego Club");
    }

    #[test]
    fn text_is_length_bounded() {
        let long = "x".repeat(TITLE_MAX_LEN + 50);
        assert_eq!(sanitize_line(&long, TITLE_MAX_LEN).len(), TITLE_MAX_LEN);
    }

    #[test]
    fn running_interval_is_end_exclusive() {
        let start = Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap();
        let event = Event {
            id: "a".into(),
            title: "A".into(),
            description: String::new(),
            location: String::new(),
            start,
            end,
            status: EventStatus::Confirmed,
            all_day: false,
            recurring: false,
            categories: vec![],
            registration_url: None,
            audience: Audience::Adults,
        };

        assert!(event.is_running_at(start));
        assert!(!event.is_running_at(end));
        assert!(event.starts_after(start - Duration::seconds(1)));
        assert_eq!(event.duration(), Duration::hours(2));
    }
}
