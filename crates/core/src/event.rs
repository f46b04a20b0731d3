//! Event model - atoms of the activity log.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::Timestamp;

/// Timestamp layouts accepted from the extractor, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Session classification scraped from the activity log.
///
/// The category is metadata only: every category counts as one lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// A regular lesson inside a unit
    UnitLesson,
    /// The "unit review" marker closing a unit
    UnitCompletion,
    /// A legendary lesson (does not close a unit)
    LegendaryLesson,
    /// Personalized practice session
    PersonalizedPractice,
    /// Story / practice session
    StoryPractice,
    /// Anything the extractor could not classify
    #[default]
    Unknown,
}

impl EventCategory {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::UnitLesson => "unit_lesson",
            EventCategory::UnitCompletion => "unit_completion",
            EventCategory::LegendaryLesson => "legendary_lesson",
            EventCategory::PersonalizedPractice => "personalized_practice",
            EventCategory::StoryPractice => "story_practice",
            EventCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One XP-earning activity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When it happened
    pub timestamp: Timestamp,

    /// XP awarded
    pub xp: u32,

    /// Unit named by the source text, if any
    #[serde(default)]
    pub explicit_unit: Option<String>,

    /// Session classification
    #[serde(default)]
    pub category: EventCategory,
}

impl Event {
    /// Create a new event without a unit name.
    pub fn new(timestamp: Timestamp, xp: u32, category: EventCategory) -> Self {
        Self {
            timestamp,
            xp,
            explicit_unit: None,
            category,
        }
    }

    /// Attach the unit named by the source text.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.explicit_unit = Some(unit.into());
        self
    }

    /// Only an explicit "unit review" closes a unit.
    pub fn is_unit_completion(&self) -> bool {
        self.category == EventCategory::UnitCompletion
    }

    /// Calendar date of the event.
    pub fn date(&self) -> chrono::NaiveDate {
        self.timestamp.date()
    }
}

/// Record as handed over by the event extractor, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Timestamp text
    #[serde(default, alias = "datetime")]
    pub timestamp: Option<String>,

    /// XP awarded
    #[serde(default)]
    pub xp: u32,

    /// Unit name token
    #[serde(default)]
    pub unit: Option<String>,

    /// Session classification
    #[serde(default, alias = "session_type")]
    pub category: EventCategory,
}

impl RawEvent {
    /// Validate into an [`Event`].
    pub fn into_event(self) -> Result<Event> {
        let text = self
            .timestamp
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::MalformedEvent("missing timestamp".to_string()))?;

        let timestamp = parse_timestamp(text)?;
        let explicit_unit = self
            .unit
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        Ok(Event {
            timestamp,
            xp: self.xp,
            explicit_unit,
            category: self.category,
        })
    }
}

impl From<&Event> for RawEvent {
    fn from(event: &Event) -> Self {
        Self {
            // `%.f` prints nothing for whole seconds.
            timestamp: Some(event.timestamp.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            xp: event.xp,
            unit: event.explicit_unit.clone(),
            category: event.category,
        }
    }
}

/// Parse an extractor timestamp.
pub fn parse_timestamp(text: &str) -> Result<Timestamp> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(|| CoreError::MalformedEvent(format!("unparseable timestamp '{}'", text)))
}

/// Result of validating a batch of raw records.
#[derive(Debug, Clone, Default)]
pub struct NormalizedEvents {
    /// Events that passed validation, in input order
    pub events: Vec<Event>,

    /// Records dropped as malformed
    pub dropped: usize,
}

/// Validate a batch; malformed records are dropped individually.
pub fn normalize_events(raw: impl IntoIterator<Item = RawEvent>) -> NormalizedEvents {
    let mut out = NormalizedEvents::default();
    for record in raw {
        match record.into_event() {
            Ok(event) => out.events.push(event),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed event");
                out.dropped += 1;
            }
        }
    }
    if out.dropped > 0 {
        tracing::warn!(dropped = out.dropped, kept = out.events.len(), "malformed events dropped");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ts: Option<&str>, unit: Option<&str>) -> RawEvent {
        RawEvent {
            timestamp: ts.map(String::from),
            xp: 10,
            unit: unit.map(String::from),
            category: EventCategory::UnitLesson,
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-06-19 08:15:00").is_ok());
        assert!(parse_timestamp("2025-06-19T08:15:00").is_ok());
        assert!(parse_timestamp("2025-06-19T08:15:00.250").is_ok());
        assert!(parse_timestamp("19/06/2025").is_err());
    }

    #[test]
    fn test_into_event_trims_unit() {
        let event = raw(Some("2025-06-19 08:15:00"), Some("  Requests ")).into_event().unwrap();
        assert_eq!(event.explicit_unit.as_deref(), Some("Requests"));

        let blank = raw(Some("2025-06-19 08:15:00"), Some("   ")).into_event().unwrap();
        assert!(blank.explicit_unit.is_none());
    }

    #[test]
    fn test_normalize_drops_malformed() {
        let batch = vec![
            raw(Some("2025-06-19 08:15:00"), None),
            raw(None, Some("Requests")),
            raw(Some("not a date"), None),
            raw(Some("2025-06-20 09:00:00"), Some("Requests")),
        ];
        let normalized = normalize_events(batch);
        assert_eq!(normalized.events.len(), 2);
        assert_eq!(normalized.dropped, 2);
    }

    #[test]
    fn test_only_unit_review_closes_unit() {
        let ts = parse_timestamp("2025-06-19 08:15:00").unwrap();
        assert!(Event::new(ts, 40, EventCategory::UnitCompletion).is_unit_completion());
        assert!(!Event::new(ts, 40, EventCategory::LegendaryLesson).is_unit_completion());
    }

    #[test]
    fn test_raw_event_accepts_extractor_aliases() {
        let json = r#"{"datetime": "2025-06-19T08:15:00", "xp": 12, "unit": null, "session_type": "personalized_practice"}"#;
        let raw: RawEvent = serde_json::from_str(json).unwrap();
        let event = raw.into_event().unwrap();
        assert_eq!(event.category, EventCategory::PersonalizedPractice);
        assert_eq!(event.xp, 12);
    }

    #[test]
    fn test_event_back_to_raw() {
        let event = raw(Some("2025-06-19T08:15:00"), Some("Requests")).into_event().unwrap();
        let back = RawEvent::from(&event);
        assert_eq!(back.timestamp.as_deref(), Some("2025-06-19 08:15:00"));
        assert_eq!(back.into_event().unwrap(), event);
    }

    #[test]
    fn test_event_back_to_raw_keeps_fractional_seconds() {
        let event = raw(Some("2025-06-19T08:15:00.250"), None).into_event().unwrap();
        let back = RawEvent::from(&event);
        assert_eq!(back.timestamp.as_deref(), Some("2025-06-19 08:15:00.250"));
        assert_eq!(back.into_event().unwrap().timestamp, event.timestamp);
    }
}
