//! Tracker configuration.
//!
//! Every policy value the engine, projector and pipeline depend on lives
//! here and is passed in at call time. Missing fields fall back to the
//! defaults below, so a config file only needs the values it overrides.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Duolingo username on duome.eu
    pub username: String,

    /// Base URL of the activity site
    pub base_url: String,

    /// Unit attribution policy
    pub attribution: AttributionPolicy,

    /// Course totals and goal horizon
    pub goal: GoalConfig,

    /// File locations
    pub paths: PathsConfig,

    /// Push notification settings
    pub notifier: NotifierConfig,

    /// Scrape retry behaviour
    pub retry: RetryConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            username: "YOUR_USERNAME".to_string(),
            base_url: "https://duome.eu".to_string(),
            attribution: AttributionPolicy::default(),
            goal: GoalConfig::default(),
            paths: PathsConfig::default(),
            notifier: NotifierConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: TrackerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    /// Load configuration, or defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.as_ref().display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject values that would make every projection meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.attribution.fold_threshold == 0 {
            return Err(CoreError::InvalidConfig(
                "attribution.fold_threshold must be at least 1".to_string(),
            ));
        }
        if self.goal.total_course_units == 0 {
            return Err(CoreError::InvalidConfig(
                "goal.total_course_units must be positive".to_string(),
            ));
        }
        if self.goal.goal_days <= 0 {
            return Err(CoreError::InvalidConfig(
                "goal.goal_days must be positive".to_string(),
            ));
        }
        if self.goal.goal_end_date().is_none() {
            return Err(CoreError::InvalidConfig(
                "goal.goal_days runs past the last representable date".to_string(),
            ));
        }
        if !(self.goal.fallback_lessons_per_unit > 0.0) {
            return Err(CoreError::InvalidConfig(
                "goal.fallback_lessons_per_unit must be positive".to_string(),
            ));
        }
        if self.goal.pace_tolerance < 0.0 {
            return Err(CoreError::InvalidConfig(
                "goal.pace_tolerance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Policy for the unit attribution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionPolicy {
    /// Events dated before this are legacy data and ignored
    pub analysis_start_date: NaiveDate,

    /// Units with fewer lessons than this fold into a neighbour
    pub fold_threshold: usize,

    /// Units without a reliable start, removed from the average
    pub excluded_units: BTreeSet<String>,
}

impl Default for AttributionPolicy {
    fn default() -> Self {
        Self {
            analysis_start_date: default_start_date(),
            fold_threshold: 8,
            excluded_units: BTreeSet::new(),
        }
    }
}

impl AttributionPolicy {
    /// Replace the fold threshold.
    pub fn with_fold_threshold(mut self, threshold: usize) -> Self {
        self.fold_threshold = threshold;
        self
    }

    /// Add a unit to the exclusion set.
    pub fn exclude(mut self, unit: impl Into<String>) -> Self {
        self.excluded_units.insert(unit.into());
        self
    }
}

/// Course totals and the fixed-day goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    /// Units in the whole course
    pub total_course_units: u32,

    /// First day of the goal window
    pub goal_start_date: NaiveDate,

    /// Length of the goal window in days
    pub goal_days: i64,

    /// Ratio used until the engine can compute one
    pub fallback_lessons_per_unit: f64,

    /// Daily lesson target for notifications
    pub daily_goal_lessons: u32,

    /// Lessons/day within which current and required pace count as equal
    pub pace_tolerance: f64,

    /// Average minutes per lesson, for time estimates
    pub mins_per_lesson: f64,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            total_course_units: 272,
            goal_start_date: default_start_date(),
            goal_days: 548,
            fallback_lessons_per_unit: 31.0,
            daily_goal_lessons: 12,
            pace_tolerance: 0.1,
            mins_per_lesson: 7.5,
        }
    }
}

impl GoalConfig {
    /// Last day of the goal window, `None` past the calendar's range.
    pub fn goal_end_date(&self) -> Option<NaiveDate> {
        chrono::Duration::try_days(self.goal_days)
            .and_then(|days| self.goal_start_date.checked_add_signed(days))
    }
}

/// File locations used by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Persisted tracker state
    pub state_file: PathBuf,

    /// Markdown progress report rewritten each cycle
    pub markdown_file: PathBuf,

    /// State backups
    pub backup_dir: PathBuf,

    /// Single-instance lock for the update cycle
    pub lock_file: PathBuf,

    /// Scraped event snapshots
    pub events_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("tracker_state.json"),
            markdown_file: PathBuf::from("personal-math.md"),
            backup_dir: PathBuf::from("data/backups"),
            lock_file: PathBuf::from("data/owlgorithm.lock"),
            events_dir: PathBuf::from("data"),
        }
    }
}

/// Pushover settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Send notifications at all
    pub enabled: bool,

    /// Pushover application token
    pub app_token: Option<String>,

    /// Pushover user key
    pub user_key: Option<String>,

    /// Messages endpoint
    pub api_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_token: None,
            user_key: None,
            api_url: "https://api.pushover.net/1/messages.json".to_string(),
            timeout_secs: 10,
        }
    }
}

impl NotifierConfig {
    /// Enabled and both credentials present.
    pub fn is_configured(&self) -> bool {
        self.enabled && self.app_token.is_some() && self.user_key.is_some()
    }
}

/// Retry and circuit breaker settings for the scrape step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay_secs: f64,

    /// Upper bound on any delay
    pub max_delay_secs: f64,

    /// Backoff multiplier
    pub exponential_base: f64,

    /// Consecutive failures before the breaker opens
    pub circuit_breaker_threshold: u32,

    /// Seconds an open breaker waits before half-opening
    pub circuit_breaker_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_secs: 1.0,
            max_delay_secs: 60.0,
            exponential_base: 2.0,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_secs: 300,
        }
    }
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"username": "owl", "attribution": {"fold_threshold": 5}}"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.username, "owl");
        assert_eq!(config.attribution.fold_threshold, 5);
        assert_eq!(config.goal.total_course_units, 272);
        assert_eq!(config.goal.goal_days, 548);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = TrackerConfig::default();
        config.attribution.fold_threshold = 0;
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_goal_past_calendar() {
        let mut config = TrackerConfig::default();
        config.goal.goal_days = 100_000_000;
        assert_eq!(config.goal.goal_end_date(), None);
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));

        config.goal.goal_days = i64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_fallback() {
        let mut config = TrackerConfig::default();
        config.goal.fallback_lessons_per_unit = 0.0;
        assert!(config.validate().is_err());
        config.goal.fallback_lessons_per_unit = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owlgorithm.json");
        std::fs::write(
            &path,
            r#"{"goal": {"goal_start_date": "2025-06-19", "goal_days": 365}, "attribution": {"excluded_units": ["On Sale"]}}"#,
        )
        .unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.goal.goal_days, 365);
        assert!(config.attribution.excluded_units.contains("On Sale"));
        assert_eq!(
            config.goal.goal_end_date(),
            NaiveDate::from_ymd_opt(2026, 6, 19)
        );
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load_or_default(dir.path().join("missing.json")).unwrap();
        assert_eq!(config.base_url, "https://duome.eu");
    }

    #[test]
    fn test_notifier_requires_credentials() {
        let mut notifier = NotifierConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(!notifier.is_configured());
        notifier.app_token = Some("token".to_string());
        notifier.user_key = Some("user".to_string());
        assert!(notifier.is_configured());
    }
}
