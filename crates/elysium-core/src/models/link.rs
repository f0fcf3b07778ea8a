//! Workspace to repository link model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

use super::{VcsProviderId, WorkspaceId};

/// Unique identifier for a workspace VCS provider link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub Ulid);

impl LinkId {
    /// Creates a new random link ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a link ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for LinkId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Binds one workspace to one repository of one provider.
///
/// A workspace has at most one link. The link holds only the provider id;
/// the provider record is loaded on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceVcsProviderLink {
    pub id: LinkId,
    pub provider_id: VcsProviderId,
    pub workspace_id: WorkspaceId,
    /// Repository path in `owner/repo` form.
    pub repository_path: String,
    /// Branch to track; defaults to the repository's default branch.
    pub branch: String,
    /// Sub-path containing the root module, cleaned; `None` means the
    /// repository root.
    pub module_directory: Option<String>,
    /// Tag events trigger runs only when the stripped ref matches.
    pub tag_regex: Option<String>,
    /// Doublestar patterns applied to repository-relative paths.
    pub glob_patterns: Vec<String>,
    /// Create speculative plans for merge request events.
    pub auto_speculative_plan: bool,
    /// Suppress webhook provisioning even when the provider auto-creates.
    pub webhook_disabled: bool,
    /// Remote webhook ID when the service provisioned one.
    pub webhook_id: Option<String>,
    /// JWT `jti` for webhook authentication; revoked by deleting the link.
    pub token_nonce: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
