//! Persisted tracker state.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use owl_core::Time;
use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: &str = "1.1";

/// State carried from one update cycle to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerState {
    /// Schema version of this document
    pub schema_version: String,

    /// Day of the last successful scrape
    pub last_scrape_date: Option<NaiveDate>,

    /// Lessons in the scraped history at the last scrape
    pub total_lessons_completed: u64,

    /// Lessons completed on `last_daily_reset`
    pub daily_lessons_completed: u32,

    /// Day the daily counter belongs to
    pub last_daily_reset: Option<NaiveDate>,

    /// Units whose completion has already been recorded
    pub processed_units: BTreeSet<String>,

    /// Last ratio computed from real unit data
    pub last_lessons_per_unit: Option<f64>,

    /// Units behind `last_lessons_per_unit`
    pub last_units_analyzed: usize,

    /// Previous day's result, for the morning notification
    pub yesterday_progress: Option<DailySummary>,

    /// When the state was last written
    pub last_updated: Option<Time>,

    /// Bookkeeping
    pub metadata: StateMetadata,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            last_scrape_date: None,
            total_lessons_completed: 0,
            daily_lessons_completed: 0,
            last_daily_reset: None,
            processed_units: BTreeSet::new(),
            last_lessons_per_unit: None,
            last_units_analyzed: 0,
            yesterday_progress: None,
            last_updated: None,
            metadata: StateMetadata::default(),
        }
    }
}

/// One finished day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    /// Day summarised
    pub date: NaiveDate,

    /// Lessons completed that day
    pub completed: u32,

    /// Goal for that day
    pub goal: u32,
}

impl DailySummary {
    /// Whether the goal was reached.
    pub fn goal_met(&self) -> bool {
        self.completed >= self.goal
    }
}

/// Creation time and applied migrations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMetadata {
    /// First time this state was written
    pub created_at: Option<Time>,

    /// Migrations applied to this document, oldest first
    pub migration_history: Vec<MigrationRecord>,
}

/// A schema migration that was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Version before
    pub from: String,

    /// Version after
    pub to: String,

    /// When it ran
    pub applied_at: Time,
}

impl TrackerState {
    /// Start a new day if `today` differs from the counter's day.
    ///
    /// The finished day is kept as `yesterday_progress`. Returns `true` when
    /// a reset happened.
    pub fn roll_day(&mut self, today: NaiveDate, daily_goal: u32) -> bool {
        if self.last_daily_reset == Some(today) {
            return false;
        }
        if let Some(previous) = self.last_daily_reset {
            self.yesterday_progress = Some(DailySummary {
                date: previous,
                completed: self.daily_lessons_completed,
                goal: daily_goal,
            });
        }
        self.daily_lessons_completed = 0;
        self.last_daily_reset = Some(today);
        true
    }

    /// The stored previous day, only if it was the calendar day before `today`.
    pub fn yesterday(&self, today: NaiveDate) -> Option<&DailySummary> {
        self.yesterday_progress
            .as_ref()
            .filter(|y| today.pred_opt() == Some(y.date))
    }

    /// Record a scrape: totals, today's count and reviewed units.
    ///
    /// Returns the units seen for the first time.
    pub fn record_scrape<I, S>(
        &mut self,
        today: NaiveDate,
        total_lessons: u64,
        lessons_today: u32,
        reviewed_units: I,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.last_scrape_date = Some(today);
        self.total_lessons_completed = total_lessons;
        self.daily_lessons_completed = lessons_today;

        reviewed_units
            .into_iter()
            .map(Into::into)
            .filter(|unit| self.processed_units.insert(unit.clone()))
            .collect()
    }

    /// Remember a freshly computed ratio.
    pub fn record_ratio(&mut self, lessons_per_unit: f64, units_analyzed: usize) {
        self.last_lessons_per_unit = Some(lessons_per_unit);
        self.last_units_analyzed = units_analyzed;
    }

    /// Stamp the write time, setting the creation time on first write.
    pub fn touch(&mut self, now: Time) {
        self.metadata.created_at.get_or_insert(now);
        self.last_updated = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[test]
    fn test_roll_day_keeps_yesterday() {
        let mut state = TrackerState::default();
        assert!(state.roll_day(date(1), 12));
        assert!(state.yesterday_progress.is_none());

        state.daily_lessons_completed = 9;
        assert!(!state.roll_day(date(1), 12));
        assert_eq!(state.daily_lessons_completed, 9);

        assert!(state.roll_day(date(2), 12));
        assert_eq!(state.daily_lessons_completed, 0);
        let yesterday = state.yesterday_progress.clone().unwrap();
        assert_eq!(yesterday.date, date(1));
        assert_eq!(yesterday.completed, 9);
        assert!(!yesterday.goal_met());
    }

    #[test]
    fn test_yesterday_skips_stale_days() {
        let mut state = TrackerState::default();
        state.roll_day(date(1), 12);
        state.daily_lessons_completed = 7;

        // Nothing ran on the 2nd and 3rd.
        state.roll_day(date(4), 12);
        assert_eq!(state.yesterday_progress.as_ref().map(|y| y.date), Some(date(1)));
        assert!(state.yesterday(date(4)).is_none());
        assert_eq!(state.yesterday(date(2)).map(|y| y.completed), Some(7));
    }

    #[test]
    fn test_record_scrape_reports_new_units() {
        let mut state = TrackerState::default();
        let first = state.record_scrape(date(1), 40, 5, ["Greetings", "Food"]);
        assert_eq!(first, vec!["Greetings".to_string(), "Food".to_string()]);

        let second = state.record_scrape(date(2), 45, 5, ["Food", "Travel"]);
        assert_eq!(second, vec!["Travel".to_string()]);
        assert_eq!(state.processed_units.len(), 3);
        assert_eq!(state.total_lessons_completed, 45);
        assert_eq!(state.last_scrape_date, Some(date(2)));
    }

    #[test]
    fn test_touch_sets_created_once() {
        let mut state = TrackerState::default();
        let first = chrono::Utc::now();
        state.touch(first);
        state.touch(first + chrono::Duration::hours(1));
        assert_eq!(state.metadata.created_at, Some(first));
        assert_eq!(state.last_updated, Some(first + chrono::Duration::hours(1)));
    }
}
