//! Notification preference models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Notification-worthy platform events a custom preference can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    FailedRun,
}

/// Per-event opt-ins for the Custom scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEvents {
    pub failed_run: bool,
}

impl CustomEvents {
    /// Whether this custom preference opts into `event`.
    pub fn includes(&self, event: NotificationEvent) -> bool {
        match event {
            NotificationEvent::FailedRun => self.failed_run,
        }
    }
}

/// How eagerly a user wants to be notified within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "custom_events")]
pub enum NotificationScope {
    All,
    Participate,
    None,
    Custom(CustomEvents),
}

impl NotificationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationScope::All => "all",
            NotificationScope::Participate => "participate",
            NotificationScope::None => "none",
            NotificationScope::Custom(_) => "custom",
        }
    }
}

/// A user's notification preference, optionally scoped to a namespace path.
///
/// The most specific matching entry wins; a user with no matching entry
/// defaults to Participate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: UserId,
    /// `None` is the user's global preference.
    pub namespace_path: Option<String>,
    pub scope: NotificationScope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn new(user_id: UserId, namespace_path: Option<String>, scope: NotificationScope) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            namespace_path,
            scope,
            created_at: now,
            updated_at: now,
        }
    }
}
