//! Scrape error types.

/// Result type for scraping.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Errors that can occur while fetching or parsing the activity page.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The page has no raw activity section
    #[error("Raw activity section not found")]
    MissingRawSection,

    /// A CSS selector failed to compile
    #[error("Invalid selector: {0}")]
    Selector(String),

    /// A pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Too many consecutive failures; requests are blocked for a while
    #[error("Circuit breaker is open, scraping paused")]
    CircuitOpen,
}
