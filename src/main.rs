#![warn(
    clippy::all,
    // clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    // clippy::unwrap_used
)]
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use clap::Parser;

use happening_now::calendar::cache::CacheEntry;
use happening_now::calendar::fetch::HttpFetcher;
use happening_now::calendar::{DisplayStatus, Event, StatusKind};
use happening_now::clock::{parse_time, Clock, SystemClock};
use happening_now::config::{self, Config};
use happening_now::logger::{self, LogExt};
use happening_now::store::{FileStore, Store};
use happening_now::{Engine, Settings};

use cli::{Command, OverrideAction};

mod cli;

const CACHE_FILE: &str = "events.json";
const OVERRIDE_FILE: &str = "override.json";

struct App {
    engine: Arc<Engine>,
    overrides: FileStore<DateTime<Utc>>,
    clock: Arc<SystemClock>,
    timezone: Tz,
    config: Config,
}

impl App {
    fn new(config: Config) -> anyhow::Result<Self> {
        let state_dir = config.state_dir()?;
        let fetcher = HttpFetcher::new(&config.feed.url_template, config.feed_id()?, config.feed_timeout())
            .context("Could not set up the feed")?;
        let settings = Settings::try_from(&config)?;
        let clock = Arc::new(SystemClock);

        log::info!(component = "main", state_dir:% = state_dir.display(); "using feed {}", fetcher.url().host_str().unwrap_or_default());

        let engine = Engine::new(
            Arc::new(fetcher),
            Arc::new(FileStore::<CacheEntry>::new(state_dir.join(CACHE_FILE))),
            clock.clone(),
            settings,
        );

        Ok(Self {
            engine: Arc::new(engine),
            overrides: FileStore::new(state_dir.join(OVERRIDE_FILE)),
            clock,
            timezone: config.timezone()?,
            config,
        })
    }

    fn override_at(&self) -> Option<DateTime<Utc>> {
        self.overrides
            .get()
            .log_warn("override", "override read", self.clock.now())
            .flatten()
    }

    /// `--at`, then the persisted override.
    fn query_at(&self, at: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
        match at {
            Some(at) => Ok(Some(parse_time(at, self.timezone)?)),
            None => Ok(self.override_at()),
        }
    }

    fn status(&self, at: Option<&str>, json: bool) -> anyhow::Result<()> {
        let status = self.engine.status(self.query_at(at)?);

        if json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            print!("{}", self.render(&status));
        }

        Ok(())
    }

    fn events(&self, at: Option<&str>) -> anyhow::Result<()> {
        let at = self.query_at(at)?.unwrap_or_else(|| self.clock.now());
        let events = self.engine.events(at).context("No events available")?;

        let mut day = None;
        for event in events.iter() {
            let start = event.start.with_timezone(&self.timezone);
            if day != Some(start.date_naive()) {
                day = Some(start.date_naive());
                println!("{}", start.format("%A, %e %B %Y"));
            }
            println!("  {}", self.line(event));
        }

        if events.is_empty() {
            println!("No events");
        }

        Ok(())
    }

    fn refresh(&self) -> anyhow::Result<()> {
        let entry = self
            .engine
            .reload(self.override_at().unwrap_or_else(|| self.clock.now()))
            .context("Refresh failed")?;

        println!(
            "Fetched {} events, valid until {}",
            entry.events.len(),
            entry.expires_at.with_timezone(&self.timezone).format("%H:%M")
        );

        Ok(())
    }

    fn administer(&self, action: OverrideAction) -> anyhow::Result<()> {
        match action {
            OverrideAction::Set { time } => {
                let at = parse_time(&time, self.timezone)?;
                self.overrides.set(at)?;
                println!("Clock overridden to {}", self.local(at));
            }
            OverrideAction::Clear => {
                self.overrides.clear()?;
                println!("Clock override cleared");
            }
            OverrideAction::Show => match self.overrides.get()? {
                Some(at) => println!("{}", self.local(at)),
                None => println!("No clock override"),
            },
        }

        Ok(())
    }

    fn watch(&self) -> anyhow::Result<()> {
        let engine = self.engine.clone();
        let clock = self.clock.clone();
        let interval = self.config.refresh_interval();

        std::thread::Builder::new()
            .name("refresh".into())
            .spawn(move || loop {
                std::thread::sleep(interval);
                let now = clock.now();
                engine.reload(now).log_warn("refresh", "periodic refresh", now);
            })
            .context("Could not start the refresh thread")?;

        let interval = self.config.query_interval();
        loop {
            let status = self.engine.status(self.override_at());
            print!("{}", self.render(&status));
            println!();
            std::thread::sleep(interval.max(Duration::from_secs(1)));
        }
    }

    fn render(&self, status: &DisplayStatus) -> String {
        let mut out = String::new();

        match (status.kind, status.salient()) {
            (StatusKind::Current, Some(event)) => {
                out += &format!("Now:  {}\n", self.line(event));
                if let Some(remaining) = &status.remaining {
                    out += &format!("      {remaining} left\n");
                }
                if let Some(next) = &status.next {
                    out += &format!("Next: {}\n", self.line(next));
                }
            }
            (StatusKind::Between, Some(event)) => {
                out += &format!("Next: {}\n", self.line(event));
                if let Some(remaining) = &status.remaining {
                    out += &format!("      starts in {remaining}\n");
                }
            }
            _ => out += "Closed\n",
        }

        if let Some(at) = status.overridden {
            out += &format!("(clock overridden to {})\n", self.local(at));
        }
        if status.stale {
            out += "(showing cached events, the feed could not be refreshed)\n";
        }
        if let Some(error) = &status.error {
            log::warn!(component = "main"; "{error}");
        }

        out
    }

    fn line(&self, event: &Event) -> String {
        format!(
            "{}-{}  {} {} [{}]",
            event.start.with_timezone(&self.timezone).format("%H:%M"),
            event.end.with_timezone(&self.timezone).format("%H:%M"),
            event.audience.glyph(),
            event.title,
            event.audience.label(),
        )
    }

    fn local(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M %Z").to_string()
    }
}

fn main() -> anyhow::Result<()> {
    logger::init();

    let cli = cli::Cli::parse();
    let config = config::init(&cli.config)
        .with_context(|| format!("Could not load the configuration file {}", cli.config.display()))?;
    let app = App::new(config)?;

    match cli.command {
        Command::Status { at, json } => app.status(at.as_deref(), json),
        Command::Events { at } => app.events(at.as_deref()),
        Command::Refresh => app.refresh(),
        Command::Override { action } => app.administer(action),
        Command::Watch => app.watch(),
    }
}
