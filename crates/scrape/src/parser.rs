//! Activity page parser.
//!
//! The profile page lists every session as an `<li>` inside `div#raw`. Item
//! text reads like `2025-07-01 09:15:02` `15XP` `Unit Name` `· lesson`,
//! with an optional `/skill/<lang>/<slug>` link naming the unit.

use owl_core::{EventCategory, RawEvent};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{Result, ScrapeError};

/// Parses session records out of an activity page.
pub struct ActivityParser {
    raw_section: Selector,
    items: Selector,
    links: Selector,
    timestamp: Regex,
    xp: Regex,
    skill_slug: Regex,
    unit_from_text: Regex,
}

impl ActivityParser {
    /// Compile selectors and patterns.
    pub fn new() -> Result<Self> {
        Ok(Self {
            raw_section: selector("div#raw")?,
            items: selector("li")?,
            links: selector("a[href]")?,
            timestamp: Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})")?,
            xp: Regex::new(r"(\d+)XP")?,
            skill_slug: Regex::new(r"/skill/[^/]+/([^/?#]+)")?,
            unit_from_text: Regex::new(r"\d+XP([A-Za-z]+)·")?,
        })
    }

    /// Extract every XP-earning session, in page order.
    pub fn parse(&self, html: &str) -> Result<Vec<RawEvent>> {
        let document = Html::parse_document(html);
        let raw = document
            .select(&self.raw_section)
            .next()
            .ok_or(ScrapeError::MissingRawSection)?;

        let mut skipped = 0usize;
        let events: Vec<RawEvent> = raw
            .select(&self.items)
            .filter_map(|item| {
                let parsed = self.parse_item(item);
                if parsed.is_none() {
                    skipped += 1;
                }
                parsed
            })
            .collect();

        debug!(events = events.len(), skipped, "activity page parsed");
        Ok(events)
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Option<RawEvent> {
        let text: String = item.text().map(str::trim).collect();
        if !text.contains("XP") {
            return None;
        }

        let stamp = self.timestamp.captures(&text)?.get(1)?;
        // Search after the timestamp so its seconds never merge into the XP digits.
        let xp = self
            .xp
            .captures(&text[stamp.end()..])?
            .get(1)?
            .as_str()
            .parse()
            .ok()?;

        let skill_link = item
            .select(&self.links)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| self.skill_slug.captures(href))
            .and_then(|c| c.get(1))
            .map(|slug| slug.as_str().replace('-', " "));

        let (category, unit) = self.classify(&text, skill_link);
        Some(RawEvent {
            timestamp: Some(stamp.as_str().to_string()),
            xp,
            unit,
            category,
        })
    }

    /// Classify one item from its flattened text and skill link.
    pub fn classify(&self, text: &str, skill_unit: Option<String>) -> (EventCategory, Option<String>) {
        let lower = text.to_lowercase();
        if lower.contains("unit review") {
            (EventCategory::UnitCompletion, None)
        } else if lower.contains("legendary") {
            (EventCategory::LegendaryLesson, None)
        } else if text.contains("personalized practice") {
            (EventCategory::PersonalizedPractice, None)
        } else if text.contains("story / practice") || text.contains("story /practice") {
            (EventCategory::StoryPractice, None)
        } else if text.contains("· lesson") {
            let unit = skill_unit.or_else(|| {
                self.unit_from_text
                    .captures(text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            });
            (EventCategory::UnitLesson, unit)
        } else if let Some(unit) = skill_unit {
            (EventCategory::UnitLesson, Some(unit))
        } else {
            (EventCategory::Unknown, None)
        }
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector(format!("{css}: {e}")))
}
