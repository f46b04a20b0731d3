//! Profile page fetching.

use std::time::Duration;

use owl_core::{normalize_events, NormalizedEvents, RetryConfig};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::parser::ActivityParser;
use crate::retry::RetryHandler;

/// Request timeout for profile pages.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const BROWSER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// HTTP client for the activity site.
#[derive(Clone)]
pub struct ProfileFetcher {
    client: Client,
    base_url: String,
}

impl ProfileFetcher {
    /// Create a fetcher for `base_url` (e.g. `https://duome.eu`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        Self {
            client: ClientBuilder::new()
                .timeout(REQUEST_TIMEOUT)
                .default_headers(headers)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Profile page URL for a user.
    pub fn profile_url(&self, username: &str) -> String {
        format!("{}/{}", self.base_url, username)
    }

    /// Fetch the raw HTML of a user's profile page.
    pub async fn fetch_profile(&self, username: &str) -> Result<String> {
        let url = self.profile_url(username);
        debug!(%url, "fetching profile page");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.text().await?)
    }
}

/// Fetch, parse and validate in one retried step.
pub struct ActivityScraper {
    fetcher: ProfileFetcher,
    parser: ActivityParser,
    retry: RetryHandler,
}

impl ActivityScraper {
    /// Create a scraper.
    pub fn new(base_url: impl Into<String>, retry: RetryConfig) -> Result<Self> {
        Ok(Self {
            fetcher: ProfileFetcher::new(base_url),
            parser: ActivityParser::new()?,
            retry: RetryHandler::new(retry),
        })
    }

    /// Scrape the user's full activity history.
    pub async fn scrape(&mut self, username: &str) -> Result<NormalizedEvents> {
        let fetcher = &self.fetcher;
        let parser = &self.parser;
        let raw = self
            .retry
            .run("scrape", || async move {
                let html = fetcher.fetch_profile(username).await?;
                parser.parse(&html)
            })
            .await?;

        let events = normalize_events(raw);
        info!(username, events = events.events.len(), dropped = events.dropped, "activity scraped");
        Ok(events)
    }

    /// Parse a saved page instead of fetching.
    pub fn parse_offline(&self, html: &str) -> Result<NormalizedEvents> {
        Ok(normalize_events(self.parser.parse(html)?))
    }
}
