use std::time::Duration;

use ureq::{Agent, AgentBuilder};
use url::Url;

use crate::error::{Error, Result};

pub const ID_PLACEHOLDER: &str = "{id}";

/// Source of the raw iCalendar document.
pub trait FeedFetcher: Send + Sync {
    /// Fetch the whole feed.
    ///
    /// # Errors
    /// Returns [`Error::FetchFailed`] for a non-success answer and
    /// [`Error::Transport`] when no answer could be read.
    fn fetch(&self) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: Agent,
    url: Url,
}

impl HttpFetcher {
    /// Builds a fetcher for the feed `id` substituted into `template`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidUrl`] if the resulting url does not parse.
    pub fn new(template: &str, id: &str, timeout: Duration) -> Result<Self> {
        let url = feed_url(template, id)?;
        let agent = AgentBuilder::new().timeout(timeout).build();

        Ok(Self { agent, url })
    }

    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl FeedFetcher for HttpFetcher {
    fn fetch(&self) -> Result<String> {
        log::debug!(component = "fetch"; "requesting {}", self.url);

        let body = self
            .agent
            .get(self.url.as_str())
            .set("Accept", "text/calendar")
            .call()?
            .into_string()
            .map_err(|e| Error::Transport(e.to_string()))?;

        log::info!(component = "fetch", bytes = body.len(); "fetched feed");

        Ok(body)
    }
}

/// Substitutes `id` into `template` and parses the result. `webcal://`
/// subscriptions are fetched over https.
///
/// # Errors
/// Returns [`Error::InvalidUrl`] if the result is not an absolute url.
pub fn feed_url(template: &str, id: &str) -> Result<Url> {
    let raw = template.trim().replace(ID_PLACEHOLDER, id.trim());

    let raw = match raw.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("webcal") => format!("https://{rest}"),
        _ => raw,
    };

    Url::parse(&raw).map_err(|e| Error::InvalidUrl {
        url: raw.clone(),
        message: e.to_string(),
    })
}
