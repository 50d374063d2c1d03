use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::validate::partition;
use super::Event;

pub const CLOSED_THEME: &str = "closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// An event is running.
    Current,
    /// Nothing is running, but an event starts within the look-ahead horizon.
    Between,
    Closed,
}

/// What the display shows at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayStatus {
    pub kind: StatusKind,
    pub current: Option<Event>,
    /// Nearest event starting within the horizon, also while one is running.
    pub next: Option<Event>,
    pub at: DateTime<Utc>,
    pub overridden: Option<DateTime<Utc>>,
    /// Time left of the current event, or until the next one starts.
    pub remaining: Option<String>,
    pub theme: String,
    pub error: Option<String>,
    /// The event list is past its TTL because a refresh failed.
    pub stale: bool,
}

impl DisplayStatus {
    /// The event the status reports on.
    pub fn salient(&self) -> Option<&Event> {
        match self.kind {
            StatusKind::Current => self.current.as_ref(),
            StatusKind::Between => self.next.as_ref(),
            StatusKind::Closed => None,
        }
    }

    /// Closed status carrying an error, for when no event list is available.
    pub fn degraded(at: DateTime<Utc>, overridden: Option<DateTime<Utc>>, error: String) -> Self {
        Self {
            kind: StatusKind::Closed,
            current: None,
            next: None,
            at,
            overridden,
            remaining: None,
            theme: CLOSED_THEME.to_owned(),
            error: Some(error),
            stale: false,
        }
    }

    pub fn with_override(mut self, overridden: Option<DateTime<Utc>>) -> Self {
        self.overridden = overridden;
        self
    }
}

/// Computes the display status of a filtered event list at `at`.
pub fn compute(events: &[Event], at: DateTime<Utc>, lookahead: Duration) -> DisplayStatus {
    let partition = partition(events, at);

    // Earliest start wins; min_by_key keeps the first of equal starts.
    let current = partition.current.iter().copied().min_by_key(|e| e.start);
    let next = partition
        .upcoming
        .first()
        .copied()
        .filter(|e| e.start - at <= lookahead);

    let (kind, remaining, theme) = match (current, next) {
        (Some(current), _) => (
            StatusKind::Current,
            Some(format_remaining(current.end - at)),
            current.audience.theme(),
        ),
        (None, Some(next)) => (
            StatusKind::Between,
            Some(format_remaining(next.start - at)),
            next.audience.theme(),
        ),
        (None, None) => (StatusKind::Closed, None, CLOSED_THEME),
    };

    DisplayStatus {
        kind,
        current: current.cloned(),
        next: next.cloned(),
        at,
        overridden: None,
        remaining,
        theme: theme.to_owned(),
        error: None,
        stale: false,
    }
}

/// Formats a span rounded up to whole minutes, e.g. `1h 25m`.
pub fn format_remaining(span: Duration) -> String {
    let minutes = (span.num_seconds().max(0) + 59) / 60;
    if minutes == 0 {
        return "0m".to_owned();
    }

    let seconds = u64::try_from(minutes * 60).unwrap_or_default();
    humantime::format_duration(std::time::Duration::from_secs(seconds)).to_string()
}
