//! Answers "what is happening now, and what is next" from a cached event list,
//! running fetch → parse → filter only when the cache cannot answer.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::calendar::cache::CacheEntry;
use crate::calendar::fetch::FeedFetcher;
use crate::calendar::{compute, filter, parse, DisplayStatus, Event, ParserOptions, Window};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::LogExt;
use crate::store::Store;

const COMPONENT: &str = "engine";

#[derive(Debug, Clone)]
pub struct Settings {
    pub ttl: Duration,
    pub lookahead: Duration,
    /// How far before the query instant event starts are kept, so long
    /// running events stay visible.
    pub lookback: Duration,
    pub lookforward: Duration,
    pub parser: ParserOptions,
}

impl Settings {
    /// The parse window for a pipeline run answering a query at `at`.
    pub fn window_around(&self, at: DateTime<Utc>) -> Window {
        Window::around(at, self.lookback, self.lookforward.max(self.lookahead))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(25),
            lookahead: Duration::hours(2),
            lookback: Duration::days(1),
            lookforward: Duration::days(7),
            parser: ParserOptions::default(),
        }
    }
}

impl TryFrom<&Config> for Settings {
    type Error = Error;

    fn try_from(config: &Config) -> Result<Self> {
        Ok(Self {
            ttl: seconds(config.cache.ttl),
            lookahead: seconds(config.status.lookahead),
            lookback: Duration::days(i64::from(config.window.past_days)),
            lookforward: Duration::days(i64::from(config.window.future_days)),
            parser: ParserOptions {
                timezone: config.timezone()?,
            },
        })
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value.min(u64::from(u32::MAX))).unwrap_or_default())
}

/// The list a query is answered from, with what went wrong getting it.
struct Resolved {
    entry: Option<CacheEntry>,
    stale: bool,
    error: Option<Error>,
}

pub struct Engine {
    fetcher: Arc<dyn FeedFetcher>,
    cache: Arc<dyn Store<CacheEntry>>,
    clock: Arc<dyn Clock>,
    settings: Settings,
    gate: Mutex<()>,
}

impl Engine {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        cache: Arc<dyn Store<CacheEntry>>,
        clock: Arc<dyn Clock>,
        settings: Settings,
    ) -> Self {
        Self {
            fetcher,
            cache,
            clock,
            settings,
            gate: Mutex::new(()),
        }
    }

    /// The display status at `overridden`, or at the clock's now. Never fails:
    /// upstream trouble shows up as `stale` and `error` on the result.
    pub fn status(&self, overridden: Option<DateTime<Utc>>) -> DisplayStatus {
        let at = overridden.unwrap_or_else(|| self.clock.now());
        let resolved = self.resolve(at);

        match resolved.entry {
            Some(entry) => {
                let mut status = compute(&entry.events, at, self.settings.lookahead).with_override(overridden);
                status.stale = resolved.stale;
                status.error = resolved.error.map(|e| e.to_string());
                status
            }
            None => DisplayStatus::degraded(
                at,
                overridden,
                resolved.error.map(|e| e.to_string()).unwrap_or_default(),
            ),
        }
    }

    /// The filtered events the status at `at` is computed from.
    ///
    /// # Errors
    /// Returns the upstream error if no list can be obtained.
    pub fn events(&self, at: DateTime<Utc>) -> Result<Arc<Vec<Event>>> {
        let resolved = self.resolve(at);

        match resolved.entry {
            Some(entry) => Ok(entry.events),
            None => Err(resolved
                .error
                .unwrap_or_else(|| Error::Transport("no event list available".into()))),
        }
    }

    /// Runs the pipeline for a query at `at` unless the cache can answer it.
    /// Callers that miss concurrently wait on one another and only the first
    /// fetches.
    ///
    /// # Errors
    /// Returns an error if the feed cannot be fetched.
    pub fn refresh(&self, at: DateTime<Utc>) -> Result<CacheEntry> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = self.lookup(self.clock.now(), at) {
            log::debug!(component = COMPONENT, at:% = at; "refreshed concurrently, skipping fetch");
            return Ok(entry);
        }

        self.run(at)
    }

    /// Runs the pipeline regardless of the cache. This is what a periodic
    /// refresh job calls.
    ///
    /// # Errors
    /// Returns an error if the feed cannot be fetched.
    pub fn reload(&self, at: DateTime<Utc>) -> Result<CacheEntry> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.run(at)
    }

    fn resolve(&self, at: DateTime<Utc>) -> Resolved {
        if let Some(entry) = self.lookup(self.clock.now(), at) {
            return Resolved {
                entry: Some(entry),
                stale: false,
                error: None,
            };
        }

        match self.refresh(at) {
            Ok(entry) => Resolved {
                entry: Some(entry),
                stale: false,
                error: None,
            },
            Err(error) => {
                log::warn!(component = COMPONENT, at:% = at; "refresh failed: {error}");

                // An expired list still beats nothing when upstream is down,
                // but only for the period it was built for.
                let entry = self
                    .cached()
                    .filter(|_| error.is_upstream())
                    .filter(|entry| entry.covers(at, self.settings.lookback, self.settings.lookahead));

                Resolved {
                    stale: entry.is_some(),
                    entry,
                    error: Some(error),
                }
            }
        }
    }

    fn cached(&self) -> Option<CacheEntry> {
        self.cache
            .get()
            .log_warn(COMPONENT, "cache read", self.clock.now())
            .flatten()
    }

    fn lookup(&self, now: DateTime<Utc>, at: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.cached()?;

        entry
            .answers(now, at, self.settings.lookback, self.settings.lookahead)
            .then_some(entry)
    }

    fn run(&self, at: DateTime<Utc>) -> Result<CacheEntry> {
        let raw = self.fetcher.fetch()?;

        let window = self.settings.window_around(at);
        let outcome = parse(&raw, &window, &self.settings.parser);
        let skipped = outcome.skipped.len();
        let filtered = filter(outcome.events);

        log::info!(
            component = COMPONENT,
            at:% = at,
            events = filtered.events.len(),
            skipped = skipped,
            rejected = filtered.rejected.len();
            "refreshed event list"
        );

        let entry = CacheEntry::new(filtered.events, self.clock.now(), self.settings.ttl, window);

        // The fresh list still answers this query if it cannot be kept.
        self.cache
            .set(entry.clone())
            .log_error(COMPONENT, "cache write", at);

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::calendar::StatusKind;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:a\r\n\
SUMMARY:Adult coloring club\r\n\
DTSTART:20240504T100000Z\r\n\
DTEND:20240504T120000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    const BOOK_WEEK: &str = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:book-week\r\n\
SUMMARY:Used book week\r\n\
DTSTART;VALUE=DATE:20240501\r\n\
DTEND;VALUE=DATE:20240507\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    struct Stub {
        calls: AtomicUsize,
        feed: &'static str,
        failure: Option<fn() -> Error>,
    }

    impl Stub {
        fn new(feed: &'static str, failure: Option<fn() -> Error>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                feed,
                failure,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl FeedFetcher for Stub {
        fn fetch(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failure {
                Some(failure) => Err(failure()),
                None => Ok(self.feed.to_owned()),
            }
        }
    }

    fn unavailable() -> Error {
        Error::FetchFailed { status: 503 }
    }

    fn misconfigured() -> Error {
        Error::InvalidUrl {
            url: "nope".into(),
            message: "relative URL without a base".into(),
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 4, hour, minute, 0).unwrap()
    }

    fn engine_with(stub: &Arc<Stub>, cache: MemoryStore<CacheEntry>, settings: Settings) -> Engine {
        Engine::new(
            stub.clone(),
            Arc::new(cache),
            Arc::new(ManualClock::new(at(11, 0))),
            settings,
        )
    }

    fn engine(failure: Option<fn() -> Error>) -> (Engine, Arc<Stub>) {
        let stub = Stub::new(FEED, failure);
        let engine = engine_with(&stub, MemoryStore::new(), Settings::default());
        (engine, stub)
    }

    /// An entry fetched at 10:00 that has expired by 11:00.
    fn expired_entry() -> CacheEntry {
        let settings = Settings::default();
        let window = settings.window_around(at(10, 0));
        let events = parse(FEED, &window, &settings.parser).events;

        CacheEntry::new(events, at(10, 0), settings.ttl, window)
    }

    #[test]
    fn window_reaches_at_least_the_lookahead() {
        let settings = Settings {
            lookforward: Duration::zero(),
            ..Settings::default()
        };

        assert_eq!(settings.window_around(at(11, 0)).end, at(13, 0));
    }

    #[test]
    fn refresh_skips_fetch_when_cache_answers() {
        let (engine, stub) = engine(None);

        engine.refresh(at(11, 0)).unwrap();
        engine.refresh(at(11, 0)).unwrap();
        assert_eq!(stub.calls(), 1);

        engine.reload(at(11, 0)).unwrap();
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn failure_without_cache_is_closed() {
        let (engine, _) = engine(Some(unavailable));
        let status = engine.status(None);

        assert_eq!(status.kind, StatusKind::Closed);
        assert_eq!(status.error.as_deref(), Some("upstream answered with status 503"));
    }

    #[test]
    fn events_keep_the_upstream_error() {
        let (engine, _) = engine(Some(unavailable));

        assert!(matches!(
            engine.events(at(11, 0)),
            Err(Error::FetchFailed { status: 503 })
        ));
    }

    #[test]
    fn upstream_failure_falls_back_to_the_expired_entry() {
        let stub = Stub::new(FEED, Some(unavailable));
        let engine = engine_with(&stub, MemoryStore::with(expired_entry()), Settings::default());

        let status = engine.status(None);
        assert_eq!(status.kind, StatusKind::Current);
        assert!(status.stale);
        assert_eq!(engine.events(at(11, 0)).unwrap().len(), 1);
    }

    #[test]
    fn other_failures_do_not_serve_stale_events() {
        let stub = Stub::new(FEED, Some(misconfigured));
        let engine = engine_with(&stub, MemoryStore::with(expired_entry()), Settings::default());

        let status = engine.status(None);
        assert_eq!(status.kind, StatusKind::Closed);
        assert!(!status.stale);
        assert!(matches!(engine.events(at(11, 0)), Err(Error::InvalidUrl { .. })));
    }

    #[test]
    fn events_starting_before_the_lookback_are_not_seen() {
        let stub = Stub::new(BOOK_WEEK, None);
        let engine = engine_with(&stub, MemoryStore::new(), Settings::default());
        assert_eq!(engine.status(None).kind, StatusKind::Closed);

        let settings = Settings {
            lookback: Duration::days(4),
            ..Settings::default()
        };
        let engine = engine_with(&stub, MemoryStore::new(), settings);
        let status = engine.status(None);

        assert_eq!(status.kind, StatusKind::Current);
        assert_eq!(status.current.map(|e| e.id), Some("book-week".to_owned()));
    }

    #[test]
    fn concurrent_misses_fetch_once() {
        let (engine, stub) = engine(None);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert_eq!(engine.status(None).kind, StatusKind::Current);
                });
            }
        });

        assert_eq!(stub.calls(), 1);
    }
}
