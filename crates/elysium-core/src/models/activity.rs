//! Activity event model for the audit trail collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actions recorded against the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    CreateVcsProvider,
    UpdateVcsProvider,
    DeleteVcsProvider,
    ResetVcsProviderOAuthToken,
    CreateVcsProviderLink,
    DeleteVcsProviderLink,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::CreateVcsProvider => "create_vcs_provider",
            ActivityAction::UpdateVcsProvider => "update_vcs_provider",
            ActivityAction::DeleteVcsProvider => "delete_vcs_provider",
            ActivityAction::ResetVcsProviderOAuthToken => "reset_vcs_provider_oauth_token",
            ActivityAction::CreateVcsProviderLink => "create_vcs_provider_link",
            ActivityAction::DeleteVcsProviderLink => "delete_vcs_provider_link",
        }
    }
}

/// A single activity-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub action: ActivityAction,
    /// Resource path of the target, e.g. `"acme/platform/gitlab-main"`.
    pub target_path: String,
    /// Identity of the initiator, as rendered by the auth layer.
    pub initiator: String,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(action: ActivityAction, target_path: &str, initiator: &str) -> Self {
        Self {
            action,
            target_path: target_path.to_string(),
            initiator: initiator.to_string(),
            occurred_at: Utc::now(),
        }
    }
}
