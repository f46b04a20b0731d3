//! Unit attribution: which unit each lesson belongs to.
//!
//! The activity log has no unit identifier, only a skill slug on some
//! lessons. A unit therefore starts at the first event naming it, and every
//! event after that (practice included) counts toward it until the next unit
//! starts. The last unit is still in progress and never enters the average;
//! short units are folded into a neighbour so bundled sub-skills do not drag
//! the ratio down.

use std::collections::{BTreeSet, HashMap};

use owl_core::{AttributionPolicy, Event, UnitBoundary, UnitLessonCount};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProgressError, Result};

/// A small unit merged into a neighbour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldRecord {
    /// Unit that was folded away
    pub unit: String,

    /// Unit that received its lessons
    pub into: String,

    /// Lessons moved (its own plus anything already folded into it)
    pub lessons: usize,

    /// Direction of the fold
    pub direction: FoldDirection,
}

/// Which neighbour received a folded unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldDirection {
    /// Folded into the preceding unit
    Backward,
    /// Folded into the following unit
    Forward,
}

/// Why a unit was left out of the average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Chronologically last unit, no closing boundary observed yet
    InProgress,
    /// Listed in the policy's exclusion set
    Configured,
}

/// A unit left out of the average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedUnit {
    /// Unit name
    pub unit: String,

    /// Lessons that were assigned to it
    pub lessons: usize,

    /// Why it was excluded
    pub reason: ExclusionReason,
}

/// Full result of one attribution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitAnalysis {
    /// Detected boundaries, in chronological first-mention order
    pub boundaries: Vec<UnitBoundary>,

    /// Per-unit counts after assignment, before exclusion and folding
    pub raw_counts: Vec<UnitLessonCount>,

    /// Per-unit counts after exclusion and folding, in chronological order
    pub units: Vec<UnitLessonCount>,

    /// Folds applied, in the order they happened
    pub folds: Vec<FoldRecord>,

    /// Units removed before folding
    pub excluded: Vec<ExcludedUnit>,

    /// Units with a "unit review" marker inside their window
    pub reviewed_units: Vec<String>,

    /// Events inside the analysis window
    pub events_considered: usize,

    /// Events before the first boundary, not counted anywhere
    pub unassigned_events: usize,

    /// Sum of the final per-unit counts
    pub total_lessons_analyzed: usize,

    /// Average lessons per retained unit
    pub average_lessons_per_unit: f64,
}

impl UnitAnalysis {
    /// Number of units that entered the average.
    pub fn completed_units_analyzed(&self) -> usize {
        self.units.len()
    }

    /// Final count for a unit, if it was retained.
    pub fn lessons_for(&self, unit: &str) -> Option<usize> {
        self.units
            .iter()
            .find(|u| u.unit_name == unit)
            .map(|u| u.lessons)
    }

    /// The unit currently in progress.
    pub fn in_progress_unit(&self) -> Option<&str> {
        self.boundaries.last().map(|b| b.unit_name.as_str())
    }
}

/// Per-unit counts from the assignment pass.
#[derive(Debug, Clone, Default)]
struct Assignment {
    counts: Vec<usize>,
    unassigned: usize,
    reviewed: Vec<bool>,
}

/// Attribution engine.
#[derive(Debug, Clone)]
pub struct UnitAttributionEngine {
    policy: AttributionPolicy,
}

impl UnitAttributionEngine {
    /// Create a new engine with the given policy.
    pub fn new(policy: AttributionPolicy) -> Self {
        Self { policy }
    }

    /// Run the full attribution over an unordered event list.
    pub fn analyze(&self, events: &[Event]) -> Result<UnitAnalysis> {
        let window = self.window(events);
        debug!(
            total = events.len(),
            considered = window.len(),
            start = %self.policy.analysis_start_date,
            "filtered events to analysis window"
        );

        let boundaries = detect_boundaries(&window);
        for boundary in &boundaries {
            debug!(unit = %boundary.unit_name, start = %boundary.start_time, "unit boundary detected");
        }
        if boundaries.len() < 2 {
            warn!(found = boundaries.len(), "need at least 2 units for analysis");
            return Err(ProgressError::InsufficientData(format!(
                "need at least 2 unit boundaries, found {}",
                boundaries.len()
            )));
        }

        let assignment = assign(&window, &boundaries);
        let raw_counts: Vec<UnitLessonCount> = boundaries
            .iter()
            .zip(&assignment.counts)
            .map(|(b, &n)| UnitLessonCount::new(b.unit_name.clone(), n))
            .collect();

        let (completed, excluded) = self.exclude(&raw_counts);
        for unit in &excluded {
            debug!(unit = %unit.unit, lessons = unit.lessons, reason = ?unit.reason, "unit excluded");
        }

        let (units, folds) = fold_small_units(
            completed,
            &self.policy.excluded_units,
            self.policy.fold_threshold,
        );
        for fold in &folds {
            debug!(
                unit = %fold.unit,
                into = %fold.into,
                lessons = fold.lessons,
                direction = ?fold.direction,
                "folded small unit"
            );
        }

        if units.is_empty() {
            warn!("no completed units left after exclusion and folding");
            return Err(ProgressError::InsufficientData(
                "no completed units left after exclusion and folding".to_string(),
            ));
        }

        let total_lessons_analyzed: usize = units.iter().map(|u| u.lessons).sum();
        let average_lessons_per_unit = total_lessons_analyzed as f64 / units.len() as f64;

        let reviewed_units = boundaries
            .iter()
            .zip(&assignment.reviewed)
            .filter(|&(_, &r)| r)
            .map(|(b, _)| b.unit_name.clone())
            .collect();

        info!(
            boundaries = boundaries.len(),
            units = units.len(),
            folds = folds.len(),
            average = average_lessons_per_unit,
            "unit analysis complete"
        );

        Ok(UnitAnalysis {
            boundaries,
            raw_counts,
            units,
            folds,
            excluded,
            reviewed_units,
            events_considered: window.len(),
            unassigned_events: assignment.unassigned,
            total_lessons_analyzed,
            average_lessons_per_unit,
        })
    }

    /// Drop legacy events and sort the rest chronologically.
    fn window<'a>(&self, events: &'a [Event]) -> Vec<&'a Event> {
        let mut window: Vec<&Event> = events
            .iter()
            .filter(|e| e.date() >= self.policy.analysis_start_date)
            .collect();
        // Stable sort keeps input order for identical timestamps.
        window.sort_by_key(|e| e.timestamp);
        window
    }

    /// Split off the in-progress unit and list every unit left out of the
    /// average. Configured exclusions stay in the completed sequence so
    /// folding can see them as neighbours.
    fn exclude(&self, counts: &[UnitLessonCount]) -> (Vec<UnitLessonCount>, Vec<ExcludedUnit>) {
        let Some((in_progress, completed)) = counts.split_last() else {
            return (Vec::new(), Vec::new());
        };

        let mut excluded: Vec<ExcludedUnit> = completed
            .iter()
            .filter(|u| self.policy.excluded_units.contains(&u.unit_name))
            .map(|u| ExcludedUnit {
                unit: u.unit_name.clone(),
                lessons: u.lessons,
                reason: ExclusionReason::Configured,
            })
            .collect();
        excluded.push(ExcludedUnit {
            unit: in_progress.unit_name.clone(),
            lessons: in_progress.lessons,
            reason: ExclusionReason::InProgress,
        });

        (completed.to_vec(), excluded)
    }
}

/// Detect unit boundaries by first mention over chronologically sorted events.
pub fn detect_boundaries(sorted: &[&Event]) -> Vec<UnitBoundary> {
    let mut seen = std::collections::HashSet::new();
    sorted
        .iter()
        .copied()
        .filter_map(|e| {
            let unit = e.explicit_unit.as_deref()?;
            seen.insert(unit).then(|| UnitBoundary {
                unit_name: unit.to_string(),
                start_time: e.timestamp,
            })
        })
        .collect()
}

/// Assign every event to the unit active when it happened.
fn assign(sorted: &[&Event], boundaries: &[UnitBoundary]) -> Assignment {
    let index: HashMap<&str, usize> = boundaries
        .iter()
        .enumerate()
        .map(|(i, b)| (b.unit_name.as_str(), i))
        .collect();

    let initial = Assignment {
        counts: vec![0; boundaries.len()],
        unassigned: 0,
        reviewed: vec![false; boundaries.len()],
    };

    let (_, assignment) = sorted.iter().fold(
        (None::<usize>, initial),
        |(current, mut acc), event| {
            let current = event
                .explicit_unit
                .as_deref()
                .and_then(|u| index.get(u).copied())
                .or(current);

            match current {
                Some(i) => {
                    acc.counts[i] += 1;
                    if event.is_unit_completion() {
                        acc.reviewed[i] = true;
                    }
                }
                None => acc.unassigned += 1,
            }
            (current, acc)
        },
    );

    assignment
}

/// Fold units under `threshold` lessons into an adjacent unit.
///
/// Units are visited once, in order. A small unit goes to the immediately
/// preceding unit when that one is still standing, otherwise to the
/// immediately following one, carrying whatever was already folded into it.
/// With no neighbour available it stays standalone.
///
/// Units named in `excluded` are dropped from the result. They still occupy
/// their place in the sequence: nothing folds into them, and nothing folds
/// across them.
pub fn fold_small_units(
    units: Vec<UnitLessonCount>,
    excluded: &BTreeSet<String>,
    threshold: usize,
) -> (Vec<UnitLessonCount>, Vec<FoldRecord>) {
    let raw: Vec<usize> = units.iter().map(|u| u.lessons).collect();
    let blocked: Vec<bool> = units.iter().map(|u| excluded.contains(&u.unit_name)).collect();
    let mut totals = raw.clone();
    let mut alive: Vec<bool> = blocked.iter().map(|b| !b).collect();
    let mut folds = Vec::new();

    for i in 0..units.len() {
        if blocked[i] || raw[i] >= threshold {
            continue;
        }

        let target = match i.checked_sub(1) {
            Some(prev) if alive[prev] => Some((prev, FoldDirection::Backward)),
            _ if i + 1 < units.len() && !blocked[i + 1] => Some((i + 1, FoldDirection::Forward)),
            _ => None,
        };

        if let Some((t, direction)) = target {
            totals[t] += totals[i];
            folds.push(FoldRecord {
                unit: units[i].unit_name.clone(),
                into: units[t].unit_name.clone(),
                lessons: totals[i],
                direction,
            });
            totals[i] = 0;
            alive[i] = false;
        }
    }

    let kept = units
        .into_iter()
        .zip(totals)
        .zip(alive)
        .filter(|(_, keep)| *keep)
        .map(|((u, lessons), _)| UnitLessonCount::new(u.unit_name, lessons))
        .collect();

    (kept, folds)
}
