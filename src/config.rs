use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Upper bound for `window.past_days` and `window.future_days`.
pub const MAX_WINDOW_DAYS: u32 = 3660;

pub const GOOGLE_PUBLIC_FEED: &str = "https://calendar.google.com/calendar/ical/{id}/public/basic.ics";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub feed: Feed,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub window: Window,
    /// Where the cached event list and the override are kept.
    pub state_dir: Option<PathBuf>,
    /// Zone for floating feed times and for times typed on the command line.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Clone, serde::Deserialize)]
pub struct Feed {
    pub id: Option<String>,
    pub id_file: Option<PathBuf>,
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Request timeout in seconds.
    #[serde(default = "default_feed_timeout")]
    pub timeout: u64,
}

// Calendar ids of public feeds act as capabilities.
impl core::fmt::Debug for Feed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Feed")
            .field("id", &"<hidden>")
            .field("id_file", &self.id_file)
            .field("url_template", &self.url_template)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Cache {
    /// Seconds an event list is served before it is fetched again.
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Status {
    /// Seconds ahead in which an upcoming event makes the status `between`.
    #[serde(default = "default_lookahead")]
    pub lookahead: u64,
    #[serde(default = "default_query_interval")]
    pub query_interval: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            lookahead: default_lookahead(),
            query_interval: default_query_interval(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Window {
    /// Days before the query instant in which event starts are kept. Must
    /// cover the longest event: one that started earlier is not shown even
    /// while it runs.
    #[serde(default = "default_past_days")]
    pub past_days: u32,
    #[serde(default = "default_future_days")]
    pub future_days: u32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            past_days: default_past_days(),
            future_days: default_future_days(),
        }
    }
}

impl Config {
    /// The feed id, read from `feed.id_file` when given.
    ///
    /// # Errors
    /// Returns an error if no id is configured.
    pub fn feed_id(&self) -> Result<&str> {
        self.feed
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config("either feed.id or feed.id_file must be set".into()))
    }

    /// # Errors
    /// Returns an error if `timezone` is not an IANA zone name.
    pub fn timezone(&self) -> Result<Tz> {
        Tz::from_str(&self.timezone).map_err(|e| Error::Config(format!("timezone: {e}")))
    }

    pub const fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout)
    }

    pub const fn query_interval(&self) -> Duration {
        Duration::from_secs(self.status.query_interval)
    }

    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.status.refresh_interval)
    }

    /// `state_dir`, or `happening-now` in the platform cache directory.
    ///
    /// # Errors
    /// Returns an error if neither is available.
    pub fn state_dir(&self) -> Result<PathBuf> {
        self.state_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME"))))
            .ok_or_else(|| Error::Config("no state_dir configured and no cache directory found".into()))
    }

    fn check(&self) -> Result<()> {
        self.feed_id()?;
        self.timezone()?;

        if self.cache.ttl == 0 {
            return Err(Error::Config("cache.ttl must be positive".into()));
        }
        if self.status.query_interval == 0 || self.status.refresh_interval == 0 {
            return Err(Error::Config("status intervals must be positive".into()));
        }
        if self.window.past_days > MAX_WINDOW_DAYS || self.window.future_days > MAX_WINDOW_DAYS {
            return Err(Error::Config(format!("window days must not exceed {MAX_WINDOW_DAYS}")));
        }

        Ok(())
    }
}

/// Reads the configuration file at `path`.
///
/// # Errors
/// Returns an error if the file or `feed.id_file` cannot be read, or the
/// configuration is invalid.
pub fn init(path: &Path) -> Result<Config> {
    let string = std::fs::read_to_string(path)?;
    let config = parse(&string)?;

    log::debug!(component = "config"; "loaded {}: {config:?}", path.display());

    Ok(config)
}

/// # Errors
/// Returns an error if `feed.id_file` cannot be read or the configuration is
/// invalid.
pub fn parse(string: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(string).map_err(|e| Error::Config(e.to_string()))?;

    if let Some(file) = &config.feed.id_file {
        let id = std::fs::read_to_string(file)?;

        config.feed.id = Some(id.trim().to_owned());
    }

    config.check()?;

    Ok(config)
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_url_template() -> String {
    GOOGLE_PUBLIC_FEED.to_owned()
}

const fn default_feed_timeout() -> u64 {
    10
}

const fn default_cache_ttl() -> u64 {
    25 * 60
}

const fn default_lookahead() -> u64 {
    2 * 60 * 60
}

const fn default_query_interval() -> u64 {
    30
}

const fn default_refresh_interval() -> u64 {
    15 * 60
}

const fn default_past_days() -> u32 {
    1
}

const fn default_future_days() -> u32 {
    7
}
