//! Progress tracking service.
//!
//! Ties metrics, attribution and projection into one report per update
//! cycle. Attribution failures never abort a cycle: the tracker falls back
//! to the last known ratio, then to the configured one.

use chrono::NaiveDate;
use owl_core::{Event, TrackerConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::attribution::{UnitAnalysis, UnitAttributionEngine};
use crate::metrics::{lessons_on, ActivityMetrics, DailyProgress};
use crate::projector::{ProgressProjector, ProgressSnapshot, ProjectionInput};

/// Where the lessons-per-unit ratio of a report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioSource {
    /// Computed from this cycle's events
    Fresh,
    /// Last known-good ratio from persisted state
    Previous,
    /// Configured fallback
    Fallback,
}

impl RatioSource {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RatioSource::Fresh => "fresh",
            RatioSource::Previous => "previous",
            RatioSource::Fallback => "fallback",
        }
    }
}

/// Everything one update cycle learns about progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Day the report was made for
    pub today: NaiveDate,

    /// Ratio used for the projection
    pub lessons_per_unit: f64,

    /// Origin of the ratio
    pub ratio_source: RatioSource,

    /// Attribution result, when it succeeded
    pub analysis: Option<UnitAnalysis>,

    /// Activity metrics, when there was any activity
    pub metrics: Option<ActivityMetrics>,

    /// Progress toward today's goal
    pub daily: DailyProgress,

    /// Course projection
    pub snapshot: ProgressSnapshot,
}

impl ProgressReport {
    /// Units analysed for the ratio, zero when it was not fresh.
    pub fn units_analyzed(&self) -> usize {
        self.analysis
            .as_ref()
            .map(UnitAnalysis::completed_units_analyzed)
            .unwrap_or(0)
    }
}

/// Progress tracking service.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    engine: UnitAttributionEngine,
    projector: ProgressProjector,
    daily_goal: u32,
    fallback_ratio: f64,
}

impl ProgressTracker {
    /// Create a tracker from configuration.
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            engine: UnitAttributionEngine::new(config.attribution.clone()),
            projector: ProgressProjector::new(config.goal.clone()),
            daily_goal: config.goal.daily_goal_lessons,
            fallback_ratio: config.goal.fallback_lessons_per_unit,
        }
    }

    /// Build a report from the full event history.
    ///
    /// `previous_ratio` is the last ratio persisted by an earlier cycle.
    pub fn report(
        &self,
        events: &[Event],
        previous_ratio: Option<f64>,
        today: NaiveDate,
    ) -> ProgressReport {
        let metrics = ActivityMetrics::compute(events, today);
        let today_count = u32::try_from(lessons_on(events, today)).unwrap_or(u32::MAX);
        let daily = DailyProgress::new(today_count, self.daily_goal);

        let (analysis, lessons_per_unit, ratio_source) = match self.engine.analyze(events) {
            Ok(analysis) => {
                let ratio = analysis.average_lessons_per_unit;
                (Some(analysis), ratio, RatioSource::Fresh)
            }
            Err(e) => {
                let (ratio, source) = self.fallback(previous_ratio);
                warn!(error = %e, ratio, source = source.as_str(), "attribution unavailable, reusing ratio");
                (None, ratio, source)
            }
        };

        let snapshot = self.projector.project(ProjectionInput {
            lessons_per_unit,
            total_lessons_completed: events.len() as u64,
            current_daily_average: metrics.as_ref().map_or(0.0, |m| m.recent_avg_lessons),
            today,
        });

        info!(
            lessons = events.len(),
            ratio = lessons_per_unit,
            source = ratio_source.as_str(),
            pace = snapshot.pace_status.as_str(),
            "progress report ready"
        );

        ProgressReport {
            today,
            lessons_per_unit,
            ratio_source,
            analysis,
            metrics,
            daily,
            snapshot,
        }
    }

    fn fallback(&self, previous_ratio: Option<f64>) -> (f64, RatioSource) {
        match previous_ratio {
            Some(ratio) if ratio.is_finite() && ratio > 0.0 => (ratio, RatioSource::Previous),
            _ => (self.fallback_ratio, RatioSource::Fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use owl_core::EventCategory;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 10).unwrap()
    }

    fn lesson(day: u32, minute: u32, unit: Option<&str>) -> Event {
        let ts = NaiveDate::from_ymd_opt(2025, 7, day)
            .unwrap()
            .and_hms_opt(9, minute, 0)
            .unwrap();
        let event = Event::new(ts, 10, EventCategory::UnitLesson);
        match unit {
            Some(name) => event.with_unit(name),
            None => event,
        }
    }

    fn config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.attribution.fold_threshold = 1;
        config.goal.goal_start_date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        config.goal.total_course_units = 10;
        config
    }

    #[test]
    fn test_fresh_ratio() {
        let mut events = vec![lesson(9, 0, Some("A"))];
        events.extend((1..4).map(|m| lesson(9, m, None)));
        events.push(lesson(10, 0, Some("B")));
        events.push(lesson(10, 1, None));

        let report = ProgressTracker::new(&config()).report(&events, Some(50.0), today());
        assert_eq!(report.ratio_source, RatioSource::Fresh);
        assert_eq!(report.lessons_per_unit, 4.0);
        assert_eq!(report.units_analyzed(), 1);
        assert_eq!(report.daily.completed, 2);
        assert_eq!(report.snapshot.total_lessons_completed, 6);
        assert_eq!(report.snapshot.completed_units.get(), Some(1.5));
    }

    #[test]
    fn test_falls_back_to_previous_ratio() {
        let events = vec![lesson(10, 0, Some("A")), lesson(10, 1, None)];
        let report = ProgressTracker::new(&config()).report(&events, Some(25.0), today());
        assert_eq!(report.ratio_source, RatioSource::Previous);
        assert_eq!(report.lessons_per_unit, 25.0);
        assert!(report.analysis.is_none());
        assert_eq!(report.units_analyzed(), 0);
    }

    #[test]
    fn test_falls_back_to_configured_ratio() {
        let report = ProgressTracker::new(&config()).report(&[], Some(f64::NAN), today());
        assert_eq!(report.ratio_source, RatioSource::Fallback);
        assert_eq!(report.lessons_per_unit, 31.0);
        assert!(report.metrics.is_none());
        assert_eq!(report.snapshot.current_daily_average, 0.0);
    }
}
