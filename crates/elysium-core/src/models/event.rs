//! VCS event models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::WorkspaceId;

/// Unique identifier for a VCS event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VcsEventId(pub Ulid);

impl VcsEventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates an event ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for VcsEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VcsEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for VcsEventId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Classification of a triggered ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsEventType {
    Branch,
    Tag,
    MergeRequest,
    Manual,
}

impl VcsEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsEventType::Branch => "branch",
            VcsEventType::Tag => "tag",
            VcsEventType::MergeRequest => "merge_request",
            VcsEventType::Manual => "manual",
        }
    }
}

impl std::fmt::Display for VcsEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VcsEventType {
    type Err = crate::ElysiumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branch" => Ok(VcsEventType::Branch),
            "tag" => Ok(VcsEventType::Tag),
            "merge_request" => Ok(VcsEventType::MergeRequest),
            "manual" => Ok(VcsEventType::Manual),
            _ => Err(crate::ElysiumError::Validation(format!(
                "Unknown VCS event type: {}",
                s
            ))),
        }
    }
}

/// Lifecycle status of a VCS event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsEventStatus {
    Pending,
    Finished,
    Errored,
}

impl VcsEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsEventStatus::Pending => "pending",
            VcsEventStatus::Finished => "finished",
            VcsEventStatus::Errored => "errored",
        }
    }
}

impl std::fmt::Display for VcsEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VcsEventStatus {
    type Err = crate::ElysiumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VcsEventStatus::Pending),
            "finished" => Ok(VcsEventStatus::Finished),
            "errored" => Ok(VcsEventStatus::Errored),
            _ => Err(crate::ElysiumError::Validation(format!(
                "Unknown VCS event status: {}",
                s
            ))),
        }
    }
}

/// Persistent record of a triggered ingestion.
///
/// Created Pending when triggered; the async handler moves it to Finished
/// or Errored. Status only ever advances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsEvent {
    pub id: VcsEventId,
    pub workspace_id: WorkspaceId,
    pub event_type: VcsEventType,
    pub status: VcsEventStatus,
    /// Source reference name (branch or tag), when known.
    pub source_ref: Option<String>,
    pub commit_id: Option<String>,
    pub repository_url: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VcsEvent {
    /// Creates a new pending event.
    pub fn new(
        workspace_id: WorkspaceId,
        event_type: VcsEventType,
        source_ref: Option<String>,
        commit_id: Option<String>,
        repository_url: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VcsEventId::new(),
            workspace_id,
            event_type,
            status: VcsEventStatus::Pending,
            source_ref,
            commit_id,
            repository_url,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
