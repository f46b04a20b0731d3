//! Push notifications.
//!
//! The message depends on the time of day: a goal reminder in the morning,
//! check-ins during the day and a recap at night.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Timelike;
use owl_core::NotifierConfig;
use owl_progress::DailyProgress;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};

/// Part of the day a notification is sent in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSlot {
    /// 05:00 to 10:59
    Morning,
    /// 11:00 to 15:59
    Midday,
    /// 16:00 to 20:59
    Evening,
    /// 21:00 to 04:59
    Night,
}

impl TimeSlot {
    /// Slot for an hour of the day.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => TimeSlot::Morning,
            11..=15 => TimeSlot::Midday,
            16..=20 => TimeSlot::Evening,
            _ => TimeSlot::Night,
        }
    }

    /// Slot for a local time.
    pub fn at(time: impl Timelike) -> Self {
        Self::from_hour(time.hour())
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "morning",
            TimeSlot::Midday => "midday",
            TimeSlot::Evening => "evening",
            TimeSlot::Night => "night",
        }
    }
}

/// A message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Title line
    pub title: String,
    /// Body
    pub message: String,
    /// Pushover priority, -2 to 2
    pub priority: i8,
}

impl Notification {
    /// Create a notification.
    pub fn new(title: impl Into<String>, message: impl Into<String>, priority: i8) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority,
        }
    }

    /// Confirms the push setup works.
    pub fn test(sent_at: impl std::fmt::Display) -> Self {
        Self::new(
            "🧪 Owlgorithm Test",
            format!("Test notification sent at {sent_at}.\n\nYour push setup is working! 🎉"),
            0,
        )
    }
}

/// What a time-of-day notification reports on.
#[derive(Debug, Clone)]
pub struct DayContext {
    /// Today's progress
    pub today: DailyProgress,
    /// Consecutive active days
    pub streak: usize,
    /// Result of the previous calendar day, if one was recorded
    pub yesterday: Option<DailyProgress>,
    /// Units completed today
    pub units_completed: usize,
    /// Course completion in percent, if known
    pub course_percentage: Option<f64>,
}

fn plural(n: u32) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Build the notification for a time slot.
pub fn compose(slot: TimeSlot, ctx: &DayContext) -> Notification {
    let DailyProgress {
        completed,
        goal,
        remaining,
        progress_pct,
        status,
    } = ctx.today;
    let pct = progress_pct as u32;

    match slot {
        TimeSlot::Morning => {
            let mut message = format!("Today's Target: {goal} lessons\nCurrent Streak: {} days\n", ctx.streak);
            if let Some(y) = &ctx.yesterday {
                message.push_str(&format!(
                    "Yesterday: {}/{} lessons ({}% of goal)\n",
                    y.completed, y.goal, y.progress_pct as u32
                ));
            }
            message.push_str("Keep it up! 💪");
            Notification::new("🌅 Good Morning! Daily Goal Set", message, 0)
        }
        TimeSlot::Midday => {
            let mut message = format!("Progress: {completed}/{goal} lessons ({pct}%)\n");
            if remaining > 0 {
                message.push_str(&format!("{remaining} lessons remaining today\n"));
                message.push_str(if pct >= 50 {
                    "You're on track! 📈"
                } else {
                    "Time to get going! 🚀"
                });
            } else {
                message.push_str("Daily goal achieved! 🎉");
            }
            Notification::new("☀️ Midday Check-in", message, -1)
        }
        TimeSlot::Evening if status.goal_met() => {
            let mut message = format!("Progress: {completed}/{goal} lessons ({pct}%)\n");
            if completed > goal {
                let bonus = completed - goal;
                message.push_str(&format!(
                    "Daily goal exceeded! 🎉\nBonus lesson{} completed!",
                    plural(bonus)
                ));
            } else {
                message.push_str("Daily goal achieved! 🎉");
            }
            Notification::new("🌆 Evening Update - Crushing It!", message, 0)
        }
        TimeSlot::Evening => {
            let message = format!(
                "Progress: {completed}/{goal} lessons ({pct}%)\n{remaining} lesson{} needed before bed\nYou've got this! 🎯",
                plural(remaining)
            );
            Notification::new("🌆 Evening Check - Final Push!", message, 1)
        }
        TimeSlot::Night => {
            let (title, mut message, priority) = if status.goal_met() {
                (
                    "🌙 Day Complete - Great Work!",
                    format!("Final Count: {completed}/{goal} lessons ✅\nDaily goal achieved!\n"),
                    1,
                )
            } else {
                (
                    "🌙 Day Complete - Tomorrow's Fresh Start!",
                    format!("Final Count: {completed}/{goal} lessons\nDon't worry, tomorrow's a new chance! 💪\n"),
                    if completed == 0 { 2 } else { 1 },
                )
            };
            if ctx.units_completed > 0 {
                message.push_str(&format!("Units completed: {} 🎉\n", ctx.units_completed));
            }
            if let Some(pct) = ctx.course_percentage {
                message.push_str(&format!("Overall progress: {pct:.1}% complete\n"));
            }
            message.push_str(&format!("Tomorrow's goal: {goal} lessons"));
            Notification::new(title, message, priority)
        }
    }
}

/// Delivers notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification. Returns `false` when sending is disabled.
    async fn send(&self, notification: &Notification) -> Result<bool>;
}

/// Notifier that drops everything.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, notification: &Notification) -> Result<bool> {
        debug!(title = %notification.title, "notifications disabled, not sent");
        Ok(false)
    }
}

#[derive(Deserialize)]
struct PushoverResponse {
    status: i32,
    #[serde(default)]
    errors: Vec<String>,
}

/// Pushover API client.
pub struct PushoverNotifier {
    client: Client,
    config: NotifierConfig,
}

impl PushoverNotifier {
    /// Create a Pushover client.
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            client: ClientBuilder::new()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, notification: &Notification) -> Result<bool> {
        let (Some(token), Some(user)) = (&self.config.app_token, &self.config.user_key) else {
            warn!("pushover credentials missing, notification not sent");
            return Ok(false);
        };
        if !self.config.enabled {
            debug!("pushover disabled");
            return Ok(false);
        }

        let priority = notification.priority.to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let form = [
            ("token", token.as_str()),
            ("user", user.as_str()),
            ("title", notification.title.as_str()),
            ("message", notification.message.as_str()),
            ("priority", priority.as_str()),
            ("timestamp", timestamp.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        let body: PushoverResponse = response.json().await?;

        if body.status == 1 {
            info!(title = %notification.title, "notification sent");
            Ok(true)
        } else {
            Err(ReportError::Rejected(body.errors.join("; ")))
        }
    }
}

/// Notifier for the configuration: Pushover when configured, otherwise a no-op.
pub fn from_config(config: &NotifierConfig) -> Box<dyn Notifier> {
    if config.is_configured() {
        Box::new(PushoverNotifier::new(config.clone()))
    } else {
        Box::new(NoopNotifier)
    }
}
