use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Competition {
    pub id: i64,
    pub name: String,
    pub venue: Option<String>,
    pub slug: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub visible: bool,
    pub finished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub club_name: Option<String>,
    pub slug: String,
    /// Order-of-merit position as published, e.g. `"12"`, `"T4"` or `"-"`.
    pub oom_position: Option<String>,
}

impl Player {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub send_email_on_finished: bool,
    pub send_email_on_start: bool,
    pub send_email_on_hot_streak: bool,
}

/// The per-account opt-in flag a notification kind requires.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Subscription {
    OnFinished,
    OnStart,
    OnHotStreak,
}

impl Subscription {
    pub fn column(&self) -> &'static str {
        match self {
            Subscription::OnFinished => "send_email_on_finished",
            Subscription::OnStart => "send_email_on_start",
            Subscription::OnHotStreak => "send_email_on_hot_streak",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Started,
    Finished,
    HotStreak { hole: u32 },
}

impl NotificationKind {
    /// Value stored in `result_notified.notification_type`.
    pub fn ledger_key(&self) -> String {
        match self {
            NotificationKind::Started => "started".to_string(),
            NotificationKind::Finished => "finished".to_string(),
            NotificationKind::HotStreak { hole } => format!("hot-streak-{hole}"),
        }
    }

    pub fn parse_ledger_key(s: &str) -> Option<Self> {
        match s {
            "started" => Some(NotificationKind::Started),
            "finished" => Some(NotificationKind::Finished),
            other => other
                .strip_prefix("hot-streak-")
                .and_then(|hole| hole.parse().ok())
                .map(|hole| NotificationKind::HotStreak { hole }),
        }
    }

    pub fn subscription(&self) -> Subscription {
        match self {
            NotificationKind::Started => Subscription::OnStart,
            NotificationKind::Finished => Subscription::OnFinished,
            NotificationKind::HotStreak { .. } => Subscription::OnHotStreak,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ledger_key())
    }
}
