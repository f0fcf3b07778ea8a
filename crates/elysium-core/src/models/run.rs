//! Run and configuration version hand-off models.
//!
//! Runs are owned by the run service and configuration versions by the
//! workspace service; these types shape what crosses the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::WorkspaceId;

/// Unique identifier for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Creates a new random run ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a run ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for RunId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Unique identifier for a configuration version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationVersionId(pub Ulid);

impl ConfigurationVersionId {
    /// Creates a new random configuration version ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a configuration version ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ConfigurationVersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConfigurationVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for ConfigurationVersionId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Run lifecycle states reported by the run service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Planning,
    Planned,
    /// Plan-only run finished (speculative plans and assessments end here).
    PlannedAndFinished,
    Applying,
    Applied,
    Errored,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Planning => "planning",
            RunStatus::Planned => "planned",
            RunStatus::PlannedAndFinished => "planned_and_finished",
            RunStatus::Applying => "applying",
            RunStatus::Applied => "applied",
            RunStatus::Errored => "errored",
            RunStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A run as reported by the run service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub workspace_id: WorkspaceId,
    pub configuration_version_id: Option<ConfigurationVersionId>,
    /// Username or email of the creator; system triggers use a service
    /// identity without an `@`.
    pub created_by: String,
    pub status: RunStatus,
    pub is_destroy: bool,
    pub is_assessment: bool,
    pub speculative: bool,
    /// Whether the plan detected changes (drift, for assessments).
    pub has_changes: bool,
    pub plan_error_message: Option<String>,
    pub apply_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Configuration version lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationVersionStatus {
    Pending,
    Uploaded,
    Errored,
}

/// A workspace configuration version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationVersion {
    pub id: ConfigurationVersionId,
    pub workspace_id: WorkspaceId,
    pub status: ConfigurationVersionStatus,
    /// Speculative versions produce plan-only runs with no apply stage.
    pub speculative: bool,
    pub created_at: DateTime<Utc>,
}
