//! Unit model - coursework groupings inferred from the activity log.

use serde::{Deserialize, Serialize};
use crate::Timestamp;

/// The inferred start of a unit: its first chronological mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitBoundary {
    /// Unit name as scraped
    pub unit_name: String,

    /// Timestamp of the first event naming this unit
    pub start_time: Timestamp,
}

/// Lesson count attributed to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitLessonCount {
    /// Unit name
    pub unit_name: String,

    /// Lessons counted toward the unit
    pub lessons: usize,
}

impl UnitLessonCount {
    /// Create a new count.
    pub fn new(unit_name: impl Into<String>, lessons: usize) -> Self {
        Self {
            unit_name: unit_name.into(),
            lessons,
        }
    }
}
