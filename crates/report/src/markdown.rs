//! Markdown progress report.
//!
//! The report is a hand-written document with `**Label**: value` lines. Only
//! the values are rewritten, so surrounding prose and layout survive every
//! update. `**Completed Units**` must be present; every other field is
//! rewritten only when found.

use std::path::Path;

use chrono::NaiveDate;
use owl_core::GoalConfig;
use owl_progress::{PaceStatus, ProgressReport, Projection, RatioSource};
use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::error::{ReportError, Result};

/// Shown wherever a projected value is undefined.
pub const CALCULATING: &str = "calculating...";

const DAYS_PER_MONTH: f64 = 30.44;

struct FieldRule {
    name: &'static str,
    pattern: Regex,
    required: bool,
}

impl FieldRule {
    fn bold(name: &'static str, required: bool) -> Result<Self> {
        let pattern = Regex::new(&format!(r"(\*\*{}\*\*:?[ \t]*)[^\n]*", regex::escape(name)))?;
        Ok(Self {
            name,
            pattern,
            required,
        })
    }
}

/// Rewrites report values in place.
pub struct MarkdownUpdater {
    rules: Vec<FieldRule>,
    recent_performance: Regex,
    last_updated: Regex,
}

impl MarkdownUpdater {
    /// Compile the field patterns.
    pub fn new() -> Result<Self> {
        let rules = vec![
            FieldRule::bold("Completed Units", true)?,
            FieldRule::bold("Remaining Units", false)?,
            FieldRule::bold("Total Lessons Completed", false)?,
            FieldRule::bold("Daily Average", false)?,
            FieldRule::bold("Weekly Average", false)?,
            FieldRule::bold("XP Daily Average", false)?,
            FieldRule::bold("XP Weekly Average", false)?,
            FieldRule::bold("Current Streak", false)?,
            FieldRule::bold("Daily Requirement", false)?,
            FieldRule::bold("Time Per Day Required", false)?,
            FieldRule::bold("Pace Status", false)?,
            FieldRule::bold("Projected Completion", false)?,
            FieldRule::bold("Total Lessons Needed", false)?,
        ];
        Ok(Self {
            rules,
            recent_performance: Regex::new(r"(\*\*Recent Performance\*\*[^:\n]*:[ \t]*)[^\n]*")?,
            last_updated: Regex::new(r"(\*Last updated:[ \t]*)[^*\n]*")?,
        })
    }

    /// Rewrite every known field of `content`.
    pub fn render(
        &self,
        content: &str,
        report: &ProgressReport,
        goal: &GoalConfig,
        updated_on: NaiveDate,
    ) -> Result<String> {
        let values = FieldValues::new(report, goal);
        let mut out = content.to_string();

        for rule in &self.rules {
            if !rule.pattern.is_match(&out) {
                if rule.required {
                    return Err(ReportError::MissingField(rule.name));
                }
                debug!(field = rule.name, "field not present, skipped");
                continue;
            }
            let value = values.get(rule.name);
            out = replace_value(&rule.pattern, &out, &value);
        }

        out = replace_value(&self.recent_performance, &out, &values.recent_performance());
        let stamp = updated_on.format("%B %d, %Y").to_string();
        out = replace_value(&self.last_updated, &out, &stamp);
        Ok(out)
    }

    /// Rewrite the report file at `path`.
    pub async fn update_file(
        &self,
        path: impl AsRef<Path>,
        report: &ProgressReport,
        goal: &GoalConfig,
        updated_on: NaiveDate,
    ) -> Result<()> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let rendered = self.render(&content, report, goal, updated_on)?;
        tokio::fs::write(path, rendered).await?;
        info!(path = %path.display(), "markdown report updated");
        Ok(())
    }
}

fn replace_value(pattern: &Regex, content: &str, value: &str) -> String {
    pattern
        .replace_all(content, |caps: &Captures| format!("{}{}", &caps[1], value))
        .into_owned()
}

fn or_calculating(value: Projection<String>) -> String {
    match value {
        Projection::Value(text) => text,
        Projection::Undefined(_) => CALCULATING.to_string(),
    }
}

/// Rendered field values for one report.
struct FieldValues<'a> {
    report: &'a ProgressReport,
    goal: &'a GoalConfig,
}

impl<'a> FieldValues<'a> {
    fn new(report: &'a ProgressReport, goal: &'a GoalConfig) -> Self {
        Self { report, goal }
    }

    fn get(&self, field: &str) -> String {
        let snapshot = &self.report.snapshot;
        let metrics = self.report.metrics.as_ref();
        let completed = snapshot.completed_units.map(f64::floor);
        let total_units = self.goal.total_course_units as f64;

        match field {
            "Completed Units" => or_calculating(completed.map(|c| format!("{c:.0}"))),
            "Remaining Units" => {
                or_calculating(completed.map(|c| format!("{:.0}", (total_units - c).max(0.0))))
            }
            "Total Lessons Completed" => snapshot.total_lessons_completed.to_string(),
            "Daily Average" => metrics.map_or_else(
                || CALCULATING.to_string(),
                |m| {
                    format!(
                        "{:.1} lessons/day (across {} active days)",
                        m.daily_avg_lessons, m.active_days
                    )
                },
            ),
            "Weekly Average" => metrics.map_or_else(
                || CALCULATING.to_string(),
                |m| format!("{:.1} lessons/week", m.weekly_avg_lessons),
            ),
            "XP Daily Average" => metrics.map_or_else(
                || CALCULATING.to_string(),
                |m| format!("{:.0} XP/day", m.daily_avg_xp),
            ),
            "XP Weekly Average" => metrics.map_or_else(
                || CALCULATING.to_string(),
                |m| format!("{:.0} XP/week", m.weekly_avg_xp),
            ),
            "Current Streak" => format!(
                "{} consecutive active days",
                metrics.map_or(0, |m| m.consecutive_days)
            ),
            "Daily Requirement" => self.daily_requirement(),
            "Time Per Day Required" => or_calculating(
                snapshot
                    .required_lessons_per_day
                    .map(|r| format_duration(r * self.goal.mins_per_lesson)),
            ),
            "Pace Status" => self.pace_status(),
            "Projected Completion" => self.projected_completion(),
            "Total Lessons Needed" => or_calculating(
                snapshot
                    .total_lessons_remaining
                    .and_then(|lessons| {
                        snapshot
                            .remaining_units
                            .map(|units| format!("{lessons:.0} lessons ({units:.0} remaining units)"))
                    }),
            ),
            _ => CALCULATING.to_string(),
        }
    }

    fn recent_performance(&self) -> String {
        match &self.report.metrics {
            Some(m) => format!(
                "{:.1} lessons/day, {:.0} XP/day",
                m.recent_avg_lessons, m.recent_avg_xp
            ),
            None => "0.0 lessons/day, 0 XP/day".to_string(),
        }
    }

    fn daily_requirement(&self) -> String {
        let report = self.report;
        let ratio = report.lessons_per_unit;
        let basis = match report.ratio_source {
            RatioSource::Fresh => format!(
                "based on {} recent completed units, {ratio:.1} avg lessons/unit",
                report.units_analyzed()
            ),
            source => format!("based on {ratio:.1} lessons/unit, {} ratio", source.as_str()),
        };
        or_calculating(
            report
                .snapshot
                .required_lessons_per_day
                .map(|r| format!("{r:.1} lessons/day ({basis})")),
        )
    }

    fn pace_status(&self) -> String {
        let snapshot = &self.report.snapshot;
        let Some(diff) = snapshot.pace_difference.get() else {
            return CALCULATING.to_string();
        };
        match snapshot.pace_status {
            PaceStatus::Ahead => format!("✅ AHEAD by {diff:.1} lessons/day"),
            PaceStatus::OnTrack => format!("✅ ON TRACK ({diff:+.1} lessons/day)"),
            PaceStatus::Behind => format!("⚠️ BEHIND by {:.1} lessons/day", diff.abs()),
            PaceStatus::Undefined => CALCULATING.to_string(),
        }
    }

    fn projected_completion(&self) -> String {
        let snapshot = &self.report.snapshot;
        let text = snapshot.projected_completion_date.and_then(|date| {
            let slack_days = snapshot.goal_end_date.map(|end| (end - date).num_days());
            snapshot.projected_months().and_then(|months| {
                slack_days.map(|slack_days| {
                    let slack_months = slack_days.abs() as f64 / DAYS_PER_MONTH;
                    let direction = if slack_days >= 0 { "early" } else { "late" };
                    format!(
                        "{months:.1} months ({}, {slack_months:.1} months {direction})",
                        date.format("%B %d, %Y")
                    )
                })
            })
        });
        or_calculating(text)
    }
}

/// `~H hour M minutes` from a minute count.
fn format_duration(minutes: f64) -> String {
    let total = minutes.max(0.0).round() as u64;
    format!("~{} hour {} minutes", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use owl_core::{Event, EventCategory, TrackerConfig};
    use owl_progress::ProgressTracker;

    const TEMPLATE: &str = "\
# Personal Math

- **Completed Units**: 3
- **Remaining Units**: 269
- **Total Lessons Completed**: 100

## Performance
- **Daily Average**: 5.0 lessons/day (across 3 active days)
- **Weekly Average**: 35.0 lessons/week
- **Current Streak**: 1 consecutive active days
- **Recent Performance** (last 7 days): 1.0 lessons/day, 10 XP/day

## Goal
- **Daily Requirement**: 15.0 lessons/day
- **Pace Status**: ⚠️ BEHIND by 10.0 lessons/day
- **Projected Completion**: 40.0 months (late)

*Last updated: January 01, 2025*
";

    fn config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.attribution.fold_threshold = 1;
        config.goal.total_course_units = 10;
        config.goal.goal_start_date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        config.goal.goal_days = 100;
        config
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 10).unwrap()
    }

    fn events() -> Vec<Event> {
        let at = |day: u32, minute: u32| {
            NaiveDate::from_ymd_opt(2025, 7, day)
                .unwrap()
                .and_hms_opt(9, minute, 0)
                .unwrap()
        };
        let mut events = vec![Event::new(at(9, 0), 10, EventCategory::UnitLesson).with_unit("A")];
        events.extend((1..10).map(|m| Event::new(at(9, m), 10, EventCategory::UnitLesson)));
        events.push(Event::new(at(10, 0), 10, EventCategory::UnitLesson).with_unit("B"));
        events
    }

    #[test]
    fn test_render_rewrites_fields() {
        let config = config();
        let report = ProgressTracker::new(&config).report(&events(), None, today());
        let out = MarkdownUpdater::new()
            .unwrap()
            .render(TEMPLATE, &report, &config.goal, today())
            .unwrap();

        // 11 lessons at 10 lessons/unit.
        assert!(out.contains("**Completed Units**: 1\n"));
        assert!(out.contains("**Remaining Units**: 9\n"));
        assert!(out.contains("**Total Lessons Completed**: 11\n"));
        assert!(out.contains("**Recent Performance** (last 7 days): 1.6 lessons/day, 16 XP/day"));
        assert!(out.contains("**Current Streak**: 2 consecutive active days"));
        assert!(out.contains("*Last updated: July 10, 2025*"));
        assert!(out.contains("based on 1 recent completed units, 10.0 avg lessons/unit"));
        assert!(out.starts_with("# Personal Math\n"));
        assert!(!out.contains(CALCULATING));
    }

    #[test]
    fn test_undefined_values_render_calculating() {
        let mut config = config();
        // Window already elapsed: required pace is undefined.
        config.goal.goal_days = 5;
        let report = ProgressTracker::new(&config).report(&events(), None, today());
        let out = MarkdownUpdater::new()
            .unwrap()
            .render(TEMPLATE, &report, &config.goal, today())
            .unwrap();

        assert!(out.contains(&format!("**Daily Requirement**: {CALCULATING}")));
        assert!(out.contains(&format!("**Pace Status**: {CALCULATING}")));
        assert!(out.contains("**Completed Units**: 1\n"));
    }

    #[test]
    fn test_missing_completed_units_is_error() {
        let config = config();
        let report = ProgressTracker::new(&config).report(&events(), None, today());
        let result = MarkdownUpdater::new().unwrap().render(
            "# Nothing here\n",
            &report,
            &config.goal,
            today(),
        );
        assert!(matches!(result, Err(ReportError::MissingField("Completed Units"))));
    }

    #[test]
    fn test_render_is_idempotent() {
        let config = config();
        let report = ProgressTracker::new(&config).report(&events(), None, today());
        let updater = MarkdownUpdater::new().unwrap();
        let once = updater.render(TEMPLATE, &report, &config.goal, today()).unwrap();
        let twice = updater.render(&once, &report, &config.goal, today()).unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_update_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("personal-math.md");
        std::fs::write(&path, TEMPLATE).unwrap();

        let config = config();
        let report = ProgressTracker::new(&config).report(&events(), None, today());
        MarkdownUpdater::new()
            .unwrap()
            .update_file(&path, &report, &config.goal, today())
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("**Total Lessons Completed**: 11"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(75.0), "~1 hour 15 minutes");
        assert_eq!(format_duration(-3.0), "~0 hour 0 minutes");
    }
}
