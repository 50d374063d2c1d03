use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use happening_now::calendar::cache::CacheEntry;
use happening_now::calendar::fetch::FeedFetcher;
use happening_now::calendar::{Audience, StatusKind};
use happening_now::clock::ManualClock;
use happening_now::store::{FileStore, MemoryStore, Store};
use happening_now::{Engine, Error, Result, Settings};

const FEED: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
PRODID:-//Example Library//Events//EN\r
BEGIN:VEVENT\r
UID:coloring@example.org\r
SUMMARY:Adult coloring club\r
DESCRIPTION:Relax with pencils and tea.\\nSupplies provided.\r
DTSTART:20240504T100000Z\r
DTEND:20240504T120000Z\r
STATUS:CONFIRMED\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:lego@example.org\r
SUMMARY:Family friendly LEGO club\r
DESCRIPTION:Build together! Ages 6-11.\r
DTSTART:20240504T140000Z\r
DTEND:20240504T160000Z\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:busy@example.org\r
SUMMARY:Busy - Private\r
DTSTART:20240504T123000Z\r
DTEND:20240504T133000Z\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:cancelled@example.org\r
SUMMARY:Knitting circle\r
STATUS:CANCELLED\r
DTSTART:20240504T110000Z\r
DTEND:20240504T113000Z\r
END:VEVENT\r
BEGIN:VEVENT\r
UID:broken@example.org\r
SUMMARY:No start at all\r
END:VEVENT\r
END:VCALENDAR\r
";

struct CountingFetcher {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingFetcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl FeedFetcher for CountingFetcher {
    fn fetch(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".into()));
        }

        Ok(FEED.to_owned())
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 4, hour, minute, 0).unwrap()
}

struct Harness {
    engine: Engine,
    fetcher: Arc<CountingFetcher>,
    clock: Arc<ManualClock>,
}

fn harness(cache: Arc<dyn Store<CacheEntry>>) -> Harness {
    let fetcher = CountingFetcher::new();
    let clock = Arc::new(ManualClock::new(at(11, 0)));
    let engine = Engine::new(fetcher.clone(), cache, clock.clone(), Settings::default());

    Harness { engine, fetcher, clock }
}

fn in_memory() -> Harness {
    harness(Arc::new(MemoryStore::<CacheEntry>::new()))
}

#[test]
fn answers_through_the_day() {
    let h = in_memory();

    let morning = h.engine.status(None);
    assert_eq!(morning.kind, StatusKind::Current);
    let current = morning.current.as_ref().unwrap();
    assert_eq!(current.id, "coloring@example.org");
    assert_eq!(current.audience, Audience::Adults);
    assert_eq!(current.description, "Relax with pencils and tea.\nSupplies provided.");
    assert_eq!(morning.theme, "adults");
    assert!(morning.overridden.is_none());
    assert!(!morning.stale);

    let lunch = h.engine.status(Some(at(12, 30)));
    assert_eq!(lunch.kind, StatusKind::Between);
    let next = lunch.next.as_ref().unwrap();
    assert_eq!(next.id, "lego@example.org");
    assert_eq!(next.audience, Audience::SchoolAge);
    assert_eq!(lunch.remaining.as_deref(), Some("1h 30m"));
    assert_eq!(lunch.overridden, Some(at(12, 30)));

    let evening = h.engine.status(Some(at(17, 0)));
    assert_eq!(evening.kind, StatusKind::Closed);
    assert_eq!(evening.theme, "closed");

    assert_eq!(h.fetcher.calls(), 1);
}

#[test]
fn administrative_and_cancelled_entries_are_filtered() {
    let h = in_memory();
    let events = h.engine.events(at(11, 0)).unwrap();

    let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["coloring@example.org", "lego@example.org"]);

    // The busy block sits between the two programs and must not show up.
    let status = h.engine.status(Some(at(13, 0)));
    assert_eq!(status.kind, StatusKind::Between);
    assert_eq!(status.next.map(|e| e.id), Some("lego@example.org".to_owned()));
}

#[test]
fn cache_is_refetched_exactly_once_after_ttl() {
    let h = in_memory();

    h.engine.status(None);
    h.engine.status(None);
    h.clock.advance(Duration::minutes(24));
    h.engine.status(None);
    assert_eq!(h.fetcher.calls(), 1);

    h.clock.advance(Duration::minutes(1));
    h.engine.status(None);
    h.engine.status(None);
    assert_eq!(h.fetcher.calls(), 2);
}

#[test]
fn override_outside_the_cached_window_refetches() {
    let h = in_memory();

    h.engine.status(None);
    let later = h.engine.status(Some(at(11, 0) + Duration::days(30)));

    assert_eq!(later.kind, StatusKind::Closed);
    assert!(later.error.is_none());
    assert_eq!(h.fetcher.calls(), 2);
}

#[test]
fn failed_refresh_serves_stale_events() {
    let h = in_memory();

    h.engine.status(None);
    h.fetcher.fail(true);
    h.clock.advance(Duration::minutes(30));

    let status = h.engine.status(None);
    assert_eq!(status.kind, StatusKind::Current);
    assert!(status.stale);
    assert_eq!(
        status.error.as_deref(),
        Some("upstream request could not complete: connection refused")
    );
    assert_eq!(h.fetcher.calls(), 2);

    h.fetcher.fail(false);
    let recovered = h.engine.status(None);
    assert!(!recovered.stale);
    assert!(recovered.error.is_none());
}

#[test]
fn failed_first_refresh_is_closed() {
    let h = in_memory();
    h.fetcher.fail(true);

    let status = h.engine.status(None);
    assert_eq!(status.kind, StatusKind::Closed);
    assert!(status.current.is_none());
    assert!(!status.stale);
    assert!(status.error.is_some());
}

#[test]
fn override_is_independent_of_the_wall_clock() {
    let h = in_memory();

    let first = h.engine.status(Some(at(12, 30)));
    h.clock.advance(Duration::minutes(10));
    let second = h.engine.status(Some(at(12, 30)));

    assert_eq!(first, second);
}

#[test]
fn file_cache_is_shared_between_engines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");

    let first = harness(Arc::new(FileStore::<CacheEntry>::new(&path)));
    first.engine.status(None);
    assert_eq!(first.fetcher.calls(), 1);

    let second = harness(Arc::new(FileStore::<CacheEntry>::new(&path)));
    let status = second.engine.status(None);

    assert_eq!(status.kind, StatusKind::Current);
    assert_eq!(second.fetcher.calls(), 0);
}
