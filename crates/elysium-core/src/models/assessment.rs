//! Workspace drift assessment model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::WorkspaceId;

/// Unique identifier for a workspace assessment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentId(pub Ulid);

impl AssessmentId {
    /// Creates a new random assessment ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates an assessment ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for AssessmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for AssessmentId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Latest drift-assessment state for a workspace.
///
/// One row per workspace. `completed_at` is cleared while an assessment run
/// is in flight; `version` is the optimistic-concurrency counter used when
/// re-scheduling across replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceAssessment {
    pub id: AssessmentId,
    pub workspace_id: WorkspaceId,
    pub has_drift: bool,
    pub requires_notification: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl WorkspaceAssessment {
    /// Creates a freshly started assessment.
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self {
            id: AssessmentId::new(),
            workspace_id,
            has_drift: false,
            requires_notification: false,
            started_at: Utc::now(),
            completed_at: None,
            version: 1,
        }
    }

    /// True while an assessment run is in flight.
    pub fn in_progress(&self) -> bool {
        self.completed_at.is_none()
    }
}
