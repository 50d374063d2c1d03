use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open range of event start instants, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window used to answer queries at `at`: reaches `before` into the
    /// past, so events that started earlier and still run are kept, and
    /// `after` into the future.
    pub fn around(at: DateTime<Utc>, before: Duration, after: Duration) -> Self {
        Self {
            start: at - before,
            end: at + after,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether a list parsed for this window can answer a query at `at`
    /// that needs `before` of history and `lookahead` of future.
    pub fn covers(&self, at: DateTime<Utc>, before: Duration, lookahead: Duration) -> bool {
        self.start + before <= at && at + lookahead <= self.end
    }
}
