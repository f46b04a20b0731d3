//! Report output
//!
//! Markdown progress report and time-of-day push notifications.

#![warn(missing_docs)]

pub mod error;
pub mod markdown;
pub mod notifier;

pub use error::{ReportError, Result};
pub use markdown::{MarkdownUpdater, CALCULATING};
pub use notifier::{
    compose, from_config, DayContext, NoopNotifier, Notification, Notifier, PushoverNotifier,
    TimeSlot,
};
