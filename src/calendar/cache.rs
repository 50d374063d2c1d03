use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Event, Window};

/// The filtered event list of one pipeline run. Replaced as a whole, never
/// updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub events: Arc<Vec<Event>>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The parse window the list was built for.
    pub window: Window,
}

impl CacheEntry {
    pub fn new(events: Vec<Event>, fetched_at: DateTime<Utc>, ttl: Duration, window: Window) -> Self {
        Self {
            events: Arc::new(events),
            fetched_at,
            expires_at: fetched_at + ttl,
            window,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whether the list holds every event a query at `at` can see.
    pub fn covers(&self, at: DateTime<Utc>, lookback: Duration, lookahead: Duration) -> bool {
        self.window.covers(at, lookback, lookahead)
    }

    /// A fresh entry that covers `at` answers the query without a fetch.
    pub fn answers(
        &self,
        now: DateTime<Utc>,
        at: DateTime<Utc>,
        lookback: Duration,
        lookahead: Duration,
    ) -> bool {
        self.is_fresh(now) && self.covers(at, lookback, lookahead)
    }
}
