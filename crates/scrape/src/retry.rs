//! Retry with exponential backoff and a circuit breaker.

use std::future::Future;
use std::time::{Duration, Instant};

use owl_core::RetryConfig;
use tracing::{info, warn};

use crate::error::{Result, ScrapeError};

/// Failure classes with their own backoff profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection could not be made
    Network,
    /// Request timed out
    Timeout,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError,
    /// HTTP 4xx other than 429
    Client,
    /// Page did not have the expected shape
    Parsing,
    /// Anything else
    Other,
}

impl ErrorKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Client => "client",
            ErrorKind::Parsing => "parsing",
            ErrorKind::Other => "other",
        }
    }

    /// Whether another attempt can help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Client | ErrorKind::Parsing)
    }

    /// Multipliers on the configured initial and max delay, plus the base.
    fn profile(&self, config: &RetryConfig) -> (f64, f64, f64) {
        let initial = config.initial_delay_secs;
        let max = config.max_delay_secs;
        let base = config.exponential_base;
        match self {
            ErrorKind::RateLimit => (initial * 5.0, max * 5.0, base.max(3.0)),
            ErrorKind::Network => (initial * 2.0, max * 2.0, base),
            ErrorKind::Timeout => (initial, max.min(30.0), base),
            ErrorKind::ServerError => (initial * 10.0, max * 10.0, base),
            _ => (initial, max, base),
        }
    }
}

fn status_kind(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimit,
        500..=599 => ErrorKind::ServerError,
        400..=499 => ErrorKind::Client,
        _ => ErrorKind::Other,
    }
}

impl ScrapeError {
    /// Classify for retry purposes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            ScrapeError::Http(e) => match e.status() {
                Some(status) => status_kind(status.as_u16()),
                None if e.is_connect() || e.is_request() => ErrorKind::Network,
                None => ErrorKind::Other,
            },
            ScrapeError::Status { status, .. } => status_kind(*status),
            ScrapeError::MissingRawSection
            | ScrapeError::Selector(_)
            | ScrapeError::Pattern(_) => ErrorKind::Parsing,
            ScrapeError::CircuitOpen => ErrorKind::Other,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests flow normally
    Closed,
    /// Requests are blocked
    Open,
    /// One trial request is allowed through
    HalfOpen,
}

/// Blocks requests after repeated failures until a cool-down passes.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            state: BreakerState::Closed,
            failures: 0,
            last_failure: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Consecutive failures recorded.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether a request may go out at `now`. Half-opens an expired breaker.
    pub fn can_execute_at(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let expired = self
                    .last_failure
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.timeout);
                if expired {
                    self.state = BreakerState::HalfOpen;
                }
                expired
            }
        }
    }

    /// Whether a request may go out now.
    pub fn can_execute(&mut self) -> bool {
        self.can_execute_at(Instant::now())
    }

    /// Close the breaker.
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.state = BreakerState::Closed;
    }

    /// Count a failure at `now`.
    pub fn record_failure_at(&mut self, now: Instant) {
        self.failures += 1;
        self.last_failure = Some(now);
        if self.failures >= self.threshold || self.state == BreakerState::HalfOpen {
            self.state = BreakerState::Open;
        }
    }

    /// Count a failure now.
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }
}

/// One failed attempt.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt: u32,
    /// Failure class
    pub kind: ErrorKind,
    /// Error text
    pub message: String,
    /// Wait before the next attempt
    pub delay: Duration,
}

/// Runs fallible async operations with backoff.
#[derive(Debug, Clone)]
pub struct RetryHandler {
    config: RetryConfig,
    breaker: CircuitBreaker,
    history: Vec<RetryAttempt>,
}

impl RetryHandler {
    /// Create a handler from configuration.
    pub fn new(config: RetryConfig) -> Self {
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_threshold,
            Duration::from_secs(config.circuit_breaker_timeout_secs),
        );
        Self {
            config,
            breaker,
            history: Vec::new(),
        }
    }

    /// The breaker guarding this handler.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Failed attempts so far.
    pub fn history(&self) -> &[RetryAttempt] {
        &self.history
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let (initial, max, base) = kind.profile(&self.config);
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = (initial * base.powi(exponent)).min(max);
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    pub async fn run<T, F, Fut>(&mut self, name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.breaker.can_execute() {
            warn!(operation = name, "circuit breaker open, skipping");
            return Err(ScrapeError::CircuitOpen);
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            info!(operation = name, attempt, max_attempts, "executing");
            let error = match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(e) => e,
            };

            self.breaker.record_failure();
            let kind = error.kind();
            let last = attempt >= max_attempts || !kind.is_retryable();
            let delay = if last {
                Duration::ZERO
            } else {
                self.delay_for(attempt, kind)
            };
            warn!(
                operation = name,
                attempt,
                kind = kind.as_str(),
                error = %error,
                delay_secs = delay.as_secs_f64(),
                "attempt failed"
            );
            self.history.push(RetryAttempt {
                attempt,
                kind,
                message: error.to_string(),
                delay,
            });

            if last {
                return Err(error);
            }
            if self.breaker.state() == BreakerState::Open {
                warn!(operation = name, "circuit breaker opened, giving up");
                return Err(error);
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_secs: 0.0,
            ..Default::default()
        }
    }

    fn unavailable() -> ScrapeError {
        ScrapeError::Status {
            status: 503,
            url: "https://duome.eu/owl".to_string(),
        }
    }

    #[test]
    fn test_backoff_delays() {
        let handler = RetryHandler::new(RetryConfig::default());
        assert_eq!(handler.delay_for(1, ErrorKind::Other), Duration::from_secs(1));
        assert_eq!(handler.delay_for(2, ErrorKind::Other), Duration::from_secs(2));
        assert_eq!(handler.delay_for(3, ErrorKind::Other), Duration::from_secs(4));
        assert_eq!(handler.delay_for(10, ErrorKind::Other), Duration::from_secs(60));
        assert_eq!(handler.delay_for(1, ErrorKind::RateLimit), Duration::from_secs(5));
        assert_eq!(handler.delay_for(2, ErrorKind::RateLimit), Duration::from_secs(15));
    }

    #[test]
    fn test_classification() {
        assert_eq!(unavailable().kind(), ErrorKind::ServerError);
        let too_many = ScrapeError::Status { status: 429, url: String::new() };
        assert_eq!(too_many.kind(), ErrorKind::RateLimit);
        let missing = ScrapeError::Status { status: 404, url: String::new() };
        assert!(!missing.kind().is_retryable());
        assert_eq!(ScrapeError::MissingRawSection.kind(), ErrorKind::Parsing);
    }

    #[test]
    fn test_breaker_opens_and_half_opens() {
        let start = Instant::now();
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(300));
        breaker.record_failure_at(start);
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure_at(start);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.can_execute_at(start + Duration::from_secs(10)));

        assert!(breaker.can_execute_at(start + Duration::from_secs(301)));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failures(), 0);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut handler = RetryHandler::new(instant_config(3));
        let mut calls = 0;
        let result = handler
            .run("fetch", || {
                calls += 1;
                let outcome = if calls < 3 { Err(unavailable()) } else { Ok(calls) };
                async move { outcome }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(handler.history().len(), 2);
        assert_eq!(handler.breaker().state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_parsing_errors_not_retried() {
        let mut handler = RetryHandler::new(instant_config(5));
        let mut calls = 0;
        let result: Result<()> = handler
            .run("parse", || {
                calls += 1;
                async { Err(ScrapeError::MissingRawSection) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::MissingRawSection)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_blocks() {
        let mut config = instant_config(1);
        config.circuit_breaker_threshold = 1;
        let mut handler = RetryHandler::new(config);

        let first: Result<()> = handler.run("fetch", || async { Err(unavailable()) }).await;
        assert!(first.is_err());

        let second: Result<()> = handler.run("fetch", || async { Ok(()) }).await;
        assert!(matches!(second, Err(ScrapeError::CircuitOpen)));
    }
}
