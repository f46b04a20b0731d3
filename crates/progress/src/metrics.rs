//! Activity metrics: daily counts, averages and streaks.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use owl_core::{Event, EventCategory};
use serde::{Deserialize, Serialize};

/// Calendar days in the "recent performance" window.
pub const RECENT_DAYS: i64 = 7;

/// Share of the daily goal that counts as "close".
const CLOSE_FRACTION: f64 = 0.8;

/// Activity on one calendar day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    /// Sessions (all count as lessons)
    pub sessions: usize,

    /// XP earned
    pub xp: u64,

    /// Sessions per category
    pub by_category: HashMap<EventCategory, usize>,
}

/// Per-day statistics keyed by date.
pub fn daily_stats(events: &[Event]) -> BTreeMap<NaiveDate, DayStats> {
    let mut days: BTreeMap<NaiveDate, DayStats> = BTreeMap::new();
    for event in events {
        let day = days.entry(event.date()).or_default();
        day.sessions += 1;
        day.xp += event.xp as u64;
        *day.by_category.entry(event.category).or_insert(0) += 1;
    }
    days
}

/// Lessons completed on a given date.
pub fn lessons_on(events: &[Event], date: NaiveDate) -> usize {
    events.iter().filter(|e| e.date() == date).count()
}

/// Averages and streak over the scraped history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetrics {
    /// Lessons in the history
    pub total_lessons: usize,

    /// XP in the history
    pub total_xp: u64,

    /// Days with at least one session
    pub active_days: usize,

    /// Lessons per active day
    pub daily_avg_lessons: f64,

    /// Lessons per week (daily average x 7)
    pub weekly_avg_lessons: f64,

    /// XP per active day
    pub daily_avg_xp: f64,

    /// XP per week
    pub weekly_avg_xp: f64,

    /// Lessons per calendar day over the last seven days
    pub recent_avg_lessons: f64,

    /// XP per calendar day over the last seven days
    pub recent_avg_xp: f64,

    /// Consecutive active days ending today (or yesterday)
    pub consecutive_days: usize,
}

impl ActivityMetrics {
    /// Compute metrics; `None` when there is no activity at all.
    pub fn compute(events: &[Event], today: NaiveDate) -> Option<Self> {
        let days = daily_stats(events);
        if days.is_empty() {
            return None;
        }

        let total_lessons: usize = days.values().map(|d| d.sessions).sum();
        let total_xp: u64 = days.values().map(|d| d.xp).sum();
        let active_days = days.len();

        let daily_avg_lessons = total_lessons as f64 / active_days as f64;
        let daily_avg_xp = total_xp as f64 / active_days as f64;

        // Always divided by seven: idle days pull the recent average down.
        let window_start = today - Duration::days(RECENT_DAYS - 1);
        let (recent_lessons, recent_xp) = days
            .range(window_start..=today)
            .fold((0usize, 0u64), |(n, xp), (_, d)| (n + d.sessions, xp + d.xp));

        Some(Self {
            total_lessons,
            total_xp,
            active_days,
            daily_avg_lessons,
            weekly_avg_lessons: daily_avg_lessons * 7.0,
            daily_avg_xp,
            weekly_avg_xp: daily_avg_xp * 7.0,
            recent_avg_lessons: recent_lessons as f64 / RECENT_DAYS as f64,
            recent_avg_xp: recent_xp as f64 / RECENT_DAYS as f64,
            consecutive_days: streak(&days, today),
        })
    }
}

/// Consecutive active days ending today, or yesterday if today is still empty.
fn streak(days: &BTreeMap<NaiveDate, DayStats>, today: NaiveDate) -> usize {
    let mut day = if days.contains_key(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut count = 0;
    while days.get(&day).is_some_and(|d| d.sessions > 0) {
        count += 1;
        day -= Duration::days(1);
    }
    count
}

/// Today's progress classification against the daily goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyStatus {
    /// Goal exceeded
    Ahead,
    /// Goal met exactly
    OnTrack,
    /// At least 80% of the goal
    Close,
    /// Below 80% of the goal
    Behind,
}

impl DailyStatus {
    /// Whether the daily goal has been reached.
    pub fn goal_met(&self) -> bool {
        matches!(self, DailyStatus::Ahead | DailyStatus::OnTrack)
    }
}

/// Progress toward today's lesson goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyProgress {
    /// Lessons done today
    pub completed: u32,

    /// Daily goal
    pub goal: u32,

    /// Lessons still needed today
    pub remaining: u32,

    /// Completed as a percentage of the goal
    pub progress_pct: f64,

    /// Classification
    pub status: DailyStatus,
}

impl DailyProgress {
    /// Classify `completed` lessons against `goal`.
    pub fn new(completed: u32, goal: u32) -> Self {
        let progress_pct = if goal > 0 {
            completed as f64 / goal as f64 * 100.0
        } else {
            0.0
        };

        let status = if completed > goal {
            DailyStatus::Ahead
        } else if completed == goal {
            DailyStatus::OnTrack
        } else if completed as f64 >= goal as f64 * CLOSE_FRACTION {
            DailyStatus::Close
        } else {
            DailyStatus::Behind
        };

        Self {
            completed,
            goal,
            remaining: goal.saturating_sub(completed),
            progress_pct,
            status,
        }
    }
}
