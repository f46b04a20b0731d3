//! Completion projection against the fixed-day goal.

use chrono::{Duration, NaiveDate};
use owl_core::GoalConfig;
use serde::{Deserialize, Serialize};

/// Why a projected value could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Lessons-per-unit ratio is zero or not a number
    NoLessonsPerUnit,
    /// The goal window has already elapsed
    GoalWindowElapsed,
    /// No recent activity to extrapolate from
    NoRecentActivity,
    /// Depends on a value that is itself undefined
    DependsOnUndefined,
    /// Result falls outside the representable calendar
    OutOfRange,
}

impl UndefinedReason {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UndefinedReason::NoLessonsPerUnit => "no lessons-per-unit ratio",
            UndefinedReason::GoalWindowElapsed => "goal window has elapsed",
            UndefinedReason::NoRecentActivity => "no recent activity",
            UndefinedReason::DependsOnUndefined => "depends on an undefined value",
            UndefinedReason::OutOfRange => "out of range",
        }
    }
}

/// A projected value, or the reason it is not available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection<T> {
    /// Computed value
    Value(T),
    /// Not computable; shown as "calculating..." downstream
    Undefined(UndefinedReason),
}

impl<T> Projection<T> {
    /// The value, if defined.
    pub fn value(&self) -> Option<&T> {
        match self {
            Projection::Value(v) => Some(v),
            Projection::Undefined(_) => None,
        }
    }

    /// Whether a value is available.
    pub fn is_defined(&self) -> bool {
        matches!(self, Projection::Value(_))
    }

    /// Map a defined value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Projection<U> {
        match self {
            Projection::Value(v) => Projection::Value(f(v)),
            Projection::Undefined(r) => Projection::Undefined(r),
        }
    }

    /// Chain a computation that may itself be undefined.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Projection<U>) -> Projection<U> {
        match self {
            Projection::Value(v) => f(v),
            Projection::Undefined(r) => Projection::Undefined(r),
        }
    }
}

impl<T: Copy> Projection<T> {
    /// The value as an `Option`.
    pub fn get(&self) -> Option<T> {
        self.value().copied()
    }
}

/// Divide, or report `reason` for a zero, negative or non-finite divisor.
fn ratio(numerator: f64, denominator: f64, reason: UndefinedReason) -> Projection<f64> {
    if denominator.is_finite() && denominator > 0.0 {
        Projection::Value(numerator / denominator)
    } else {
        Projection::Undefined(reason)
    }
}

/// Actual pace compared with the pace the goal requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceStatus {
    /// Current pace above requirement
    Ahead,
    /// Within tolerance of the requirement
    OnTrack,
    /// Current pace below requirement
    Behind,
    /// Requirement not computable
    Undefined,
}

impl PaceStatus {
    /// Classify `current` against `required` with a symmetric tolerance.
    pub fn classify(current: f64, required: f64, tolerance: f64) -> Self {
        let diff = current - required;
        if diff.abs() <= tolerance {
            PaceStatus::OnTrack
        } else if diff > 0.0 {
            PaceStatus::Ahead
        } else {
            PaceStatus::Behind
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaceStatus::Ahead => "AHEAD",
            PaceStatus::OnTrack => "ON TRACK",
            PaceStatus::Behind => "BEHIND",
            PaceStatus::Undefined => "CALCULATING",
        }
    }
}

/// Everything the projector needs besides the goal configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionInput {
    /// Lessons per completed unit
    pub lessons_per_unit: f64,

    /// Lessons completed so far
    pub total_lessons_completed: u64,

    /// Recent lessons per day
    pub current_daily_average: f64,

    /// Day the projection is made on
    pub today: NaiveDate,
}

/// Projected course progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Ratio the projection is based on
    pub lessons_per_unit: f64,

    /// Lessons completed so far
    pub total_lessons_completed: u64,

    /// Units completed, derived from lessons / ratio
    pub completed_units: Projection<f64>,

    /// Units still to do
    pub remaining_units: Projection<f64>,

    /// Lessons still to do
    pub total_lessons_remaining: Projection<f64>,

    /// Days since the goal started
    pub days_elapsed: i64,

    /// Days left in the goal window (may be negative)
    pub days_remaining: i64,

    /// Lessons per day needed to finish on time
    pub required_lessons_per_day: Projection<f64>,

    /// Recent lessons per day
    pub current_daily_average: f64,

    /// Current minus required lessons per day
    pub pace_difference: Projection<f64>,

    /// Pace classification
    pub pace_status: PaceStatus,

    /// Days until completion at the current pace
    pub projected_days: Projection<f64>,

    /// Completion date at the current pace
    pub projected_completion_date: Projection<NaiveDate>,

    /// Last day of the goal window
    pub goal_end_date: Projection<NaiveDate>,
}

impl ProgressSnapshot {
    /// Share of the course completed, in percent.
    pub fn course_completion_percentage(&self, total_course_units: u32) -> Projection<f64> {
        self.completed_units
            .and_then(|done| ratio(done * 100.0, total_course_units as f64, UndefinedReason::OutOfRange))
    }

    /// Months until completion at the current pace.
    pub fn projected_months(&self) -> Projection<f64> {
        self.projected_days.map(|d| d / 30.44)
    }
}

/// Turns a lessons-per-unit ratio into a daily pace and a finish date.
#[derive(Debug, Clone)]
pub struct ProgressProjector {
    goal: GoalConfig,
}

impl ProgressProjector {
    /// Create a projector for the given goal.
    pub fn new(goal: GoalConfig) -> Self {
        Self { goal }
    }

    /// Project progress. Never panics: each zero denominator yields
    /// [`Projection::Undefined`].
    pub fn project(&self, input: ProjectionInput) -> ProgressSnapshot {
        let lessons_done = input.total_lessons_completed as f64;
        let total_units = self.goal.total_course_units as f64;

        let completed_units = ratio(lessons_done, input.lessons_per_unit, UndefinedReason::NoLessonsPerUnit);
        let remaining_units = completed_units.map(|done| (total_units - done).max(0.0));
        let total_lessons_remaining = remaining_units.map(|units| units * input.lessons_per_unit);

        let days_elapsed = (input.today - self.goal.goal_start_date).num_days();
        let days_remaining = self.goal.goal_days.saturating_sub(days_elapsed);

        let required_lessons_per_day = total_lessons_remaining.and_then(|lessons| {
            ratio(lessons, days_remaining as f64, UndefinedReason::GoalWindowElapsed)
        });

        let current = input.current_daily_average;
        let pace_difference = required_lessons_per_day.map(|required| current - required);
        let pace_status = match required_lessons_per_day {
            Projection::Value(required) => {
                PaceStatus::classify(current, required, self.goal.pace_tolerance)
            }
            Projection::Undefined(_) => PaceStatus::Undefined,
        };

        let projected_days = total_lessons_remaining
            .and_then(|lessons| ratio(lessons, current, UndefinedReason::NoRecentActivity));
        let projected_completion_date =
            projected_days.and_then(|days| add_days(input.today, days));

        ProgressSnapshot {
            lessons_per_unit: input.lessons_per_unit,
            total_lessons_completed: input.total_lessons_completed,
            completed_units,
            remaining_units,
            total_lessons_remaining,
            days_elapsed,
            days_remaining,
            required_lessons_per_day,
            current_daily_average: current,
            pace_difference,
            pace_status,
            projected_days,
            projected_completion_date,
            goal_end_date: self
                .goal
                .goal_end_date()
                .map_or(Projection::Undefined(UndefinedReason::OutOfRange), Projection::Value),
        }
    }
}

/// `today` plus a fractional day count, rounded up to whole days.
fn add_days(today: NaiveDate, days: f64) -> Projection<NaiveDate> {
    // NaiveDate tops out around year 262143.
    const MAX_DAYS: f64 = 36_500_000.0;
    if !days.is_finite() || days > MAX_DAYS {
        return Projection::Undefined(UndefinedReason::OutOfRange);
    }
    today
        .checked_add_signed(Duration::days(days.ceil() as i64))
        .map(Projection::Value)
        .unwrap_or(Projection::Undefined(UndefinedReason::OutOfRange))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal() -> GoalConfig {
        GoalConfig {
            total_course_units: 100,
            goal_start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            goal_days: 400,
            pace_tolerance: 0.1,
            ..Default::default()
        }
    }

    fn input(lessons_per_unit: f64, total: u64, avg: f64, day: u32) -> ProjectionInput {
        ProjectionInput {
            lessons_per_unit,
            total_lessons_completed: total,
            current_daily_average: avg,
            today: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
        }
    }

    #[test]
    fn test_basic_projection() {
        // 20 lessons/unit, 400 lessons done -> 20 units done, 80 left, 1600 lessons.
        let snapshot = ProgressProjector::new(goal()).project(input(20.0, 400, 10.0, 1));
        assert_eq!(snapshot.completed_units.get(), Some(20.0));
        assert_eq!(snapshot.remaining_units.get(), Some(80.0));
        assert_eq!(snapshot.total_lessons_remaining.get(), Some(1600.0));
        assert_eq!(snapshot.days_elapsed, 0);
        assert_eq!(snapshot.days_remaining, 400);
        assert_eq!(snapshot.required_lessons_per_day.get(), Some(4.0));
        assert_eq!(snapshot.pace_status, PaceStatus::Ahead);
        assert_eq!(snapshot.projected_days.get(), Some(160.0));
        assert_eq!(
            snapshot.projected_completion_date.get(),
            NaiveDate::from_ymd_opt(2025, 6, 10)
        );
    }

    #[test]
    fn test_zero_lessons_per_unit_is_undefined() {
        let snapshot = ProgressProjector::new(goal()).project(input(0.0, 400, 10.0, 1));
        assert_eq!(
            snapshot.completed_units,
            Projection::Undefined(UndefinedReason::NoLessonsPerUnit)
        );
        assert!(!snapshot.required_lessons_per_day.is_defined());
        assert!(!snapshot.projected_completion_date.is_defined());
        assert_eq!(snapshot.pace_status, PaceStatus::Undefined);
    }

    #[test]
    fn test_elapsed_goal_window() {
        let mut g = goal();
        g.goal_days = 5;
        let snapshot = ProgressProjector::new(g.clone()).project(input(20.0, 400, 10.0, 6));
        assert_eq!(snapshot.days_remaining, 0);
        assert_eq!(
            snapshot.required_lessons_per_day,
            Projection::Undefined(UndefinedReason::GoalWindowElapsed)
        );
        assert_eq!(snapshot.pace_status, PaceStatus::Undefined);
        // Projection at the current pace is still available.
        assert!(snapshot.projected_completion_date.is_defined());

        let late = ProgressProjector::new(g).project(input(20.0, 400, 10.0, 20));
        assert!(late.days_remaining < 0);
        assert!(!late.required_lessons_per_day.is_defined());
    }

    #[test]
    fn test_no_recent_activity() {
        let snapshot = ProgressProjector::new(goal()).project(input(20.0, 400, 0.0, 1));
        assert_eq!(
            snapshot.projected_completion_date,
            Projection::Undefined(UndefinedReason::NoRecentActivity)
        );
        assert_eq!(snapshot.pace_status, PaceStatus::Behind);
    }

    #[test]
    fn test_pace_classification() {
        assert_eq!(PaceStatus::classify(5.0, 5.05, 0.1), PaceStatus::OnTrack);
        assert_eq!(PaceStatus::classify(5.5, 5.0, 0.1), PaceStatus::Ahead);
        assert_eq!(PaceStatus::classify(4.5, 5.0, 0.1), PaceStatus::Behind);
        assert_eq!(PaceStatus::classify(5.0, 5.0, 0.0), PaceStatus::OnTrack);
    }

    #[test]
    fn test_finished_course_clamps_remaining() {
        let snapshot = ProgressProjector::new(goal()).project(input(10.0, 5000, 3.0, 1));
        assert_eq!(snapshot.remaining_units.get(), Some(0.0));
        assert_eq!(snapshot.required_lessons_per_day.get(), Some(0.0));
        assert_eq!(
            snapshot.projected_completion_date.get(),
            NaiveDate::from_ymd_opt(2025, 1, 1)
        );
    }

    #[test]
    fn test_tiny_pace_is_out_of_range_not_panic() {
        let snapshot = ProgressProjector::new(goal()).project(input(20.0, 0, 1e-12, 1));
        assert_eq!(
            snapshot.projected_completion_date,
            Projection::Undefined(UndefinedReason::OutOfRange)
        );
    }

    #[test]
    fn test_goal_window_past_calendar_is_out_of_range() {
        let mut g = goal();
        g.goal_days = 100_000_000;
        let snapshot = ProgressProjector::new(g.clone()).project(input(20.0, 400, 10.0, 1));
        assert_eq!(
            snapshot.goal_end_date,
            Projection::Undefined(UndefinedReason::OutOfRange)
        );
        assert!(snapshot.required_lessons_per_day.is_defined());

        g.goal_days = i64::MAX;
        let snapshot = ProgressProjector::new(g).project(input(20.0, 400, 10.0, 1));
        assert!(!snapshot.goal_end_date.is_defined());
    }

    #[test]
    fn test_completion_percentage() {
        let snapshot = ProgressProjector::new(goal()).project(input(20.0, 400, 10.0, 1));
        assert_eq!(snapshot.course_completion_percentage(100).get(), Some(20.0));
    }
}
