//! Activity scraping
//!
//! Fetches the public profile page, extracts session records from its raw
//! activity section and retries transient failures behind a circuit breaker.

#![warn(missing_docs)]

pub mod error;
pub mod fetcher;
pub mod parser;
pub mod retry;

pub use error::{Result, ScrapeError};
pub use fetcher::{ActivityScraper, ProfileFetcher, REQUEST_TIMEOUT};
pub use parser::ActivityParser;
pub use retry::{BreakerState, CircuitBreaker, ErrorKind, RetryAttempt, RetryHandler};
