use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::Event;

/// Titles calendar owners use to block time rather than announce a program.
static ADMINISTRATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\W*(?:busy|private|blocked|closed|hold|placeholder|do\s+not\s+book|staff\s+only|out\s+of\s+office)\b")
        .expect("administrative title regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("title is empty")]
    EmptyTitle,
    #[error("end is not after start")]
    EndNotAfterStart,
    #[error("title is an administrative placeholder")]
    AdministrativeTitle,
    #[error("event is cancelled")]
    Cancelled,
}

/// An event that did not pass [`filter`], kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub id: String,
    pub title: String,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Filtered {
    pub events: Vec<Event>,
    pub rejected: Vec<Rejection>,
}

/// Events relative to one instant. Borrowed from an already filtered list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Partition<'a> {
    /// Running at the instant, in list order.
    pub current: Vec<&'a Event>,
    /// Starting after the instant, earliest first.
    pub upcoming: Vec<&'a Event>,
}

pub fn is_administrative(title: &str) -> bool {
    ADMINISTRATIVE.is_match(title)
}

/// Checks the structural invariants of a single event.
pub fn validate(event: &Event) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    if event.title.trim().is_empty() {
        violations.push(Violation::EmptyTitle);
    } else if is_administrative(&event.title) {
        violations.push(Violation::AdministrativeTitle);
    }

    if event.start >= event.end {
        violations.push(Violation::EndNotAfterStart);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Keeps valid, non-cancelled events in their original order.
pub fn filter(events: impl IntoIterator<Item = Event>) -> Filtered {
    let mut filtered = Filtered::default();

    for event in events {
        let mut violations = validate(&event).err().unwrap_or_default();
        if event.is_cancelled() {
            violations.push(Violation::Cancelled);
        }

        if violations.is_empty() {
            filtered.events.push(event);
            continue;
        }

        log::debug!(component = "filter", fragment = event.title.as_str(); "rejecting {}: {violations:?}", event.id);

        filtered.rejected.push(Rejection {
            id: event.id,
            title: event.title,
            violations,
        });
    }

    filtered
}

/// Splits `events` into those running at `at` and those starting after it.
pub fn partition(events: &[Event], at: DateTime<Utc>) -> Partition<'_> {
    let current = events.iter().filter(|e| e.is_running_at(at)).collect();

    let mut upcoming: Vec<&Event> = events.iter().filter(|e| e.starts_after(at)).collect();
    upcoming.sort_by_key(|e| e.start);

    Partition { current, upcoming }
}
