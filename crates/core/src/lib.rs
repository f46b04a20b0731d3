//! Owlgorithm core data models.
//!
//! This crate defines the activity events, unit boundaries and configuration
//! shared by the attribution engine, the projector and the pipeline around
//! them.

#![warn(missing_docs)]

mod config;
mod error;
mod event;
mod unit;

pub use config::{
    AttributionPolicy, GoalConfig, NotifierConfig, PathsConfig, RetryConfig, TrackerConfig,
};
pub use error::{CoreError, Result};
pub use event::{normalize_events, parse_timestamp, Event, EventCategory, NormalizedEvents, RawEvent};
pub use unit::{UnitBoundary, UnitLessonCount};

/// Wall-clock timestamp type for persisted state
pub type Time = chrono::DateTime<chrono::Utc>;

/// Local, zone-less timestamp as shown in the activity log
pub type Timestamp = chrono::NaiveDateTime;
