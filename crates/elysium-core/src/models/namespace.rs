//! Workspace and group namespace models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub Ulid);

impl WorkspaceId {
    /// Creates a new random workspace ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a workspace ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for WorkspaceId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Unique identifier for a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub Ulid);

impl GroupId {
    /// Creates a new random group ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a group ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for GroupId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Expands a namespace path into itself plus every ancestor, leaf first.
///
/// `"root/child/leaf"` yields `["root/child/leaf", "root/child", "root"]`.
pub fn expand_path(path: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut current = path;
    loop {
        paths.push(current.to_string());
        match current.rfind('/') {
            Some(idx) => current = &current[..idx],
            None => break,
        }
    }
    paths
}

/// Returns the parent namespace path, if any.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

/// A group namespace.
///
/// Unset settings inherit from ancestor groups via the leaf-to-root walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Full path, `"root/child"`; the root group has no slash.
    pub full_path: String,
    pub parent_id: Option<GroupId>,
    /// Explicit drift-detection setting; `None` inherits.
    pub drift_detection_enabled: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Creates a root group.
    pub fn new_root(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::new(),
            name: name.to_string(),
            full_path: name.to_string(),
            parent_id: None,
            drift_detection_enabled: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a child group nested under `parent`.
    pub fn new_child(parent: &Group, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::new(),
            name: name.to_string(),
            full_path: format!("{}/{}", parent.full_path, name),
            parent_id: Some(parent.id.clone()),
            drift_detection_enabled: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A workspace namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// Full path including the workspace name, `"root/child/workspace"`.
    pub full_path: String,
    pub group_id: GroupId,
    pub locked: bool,
    /// Identifier of the current state version, when one exists.
    pub current_state_version_id: Option<String>,
    /// Explicit drift-detection setting; `None` inherits from the group
    /// hierarchy.
    pub drift_detection_enabled: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    /// Creates a workspace under `group`.
    pub fn new(group: &Group, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            name: name.to_string(),
            full_path: format!("{}/{}", group.full_path, name),
            group_id: group.id.clone(),
            locked: false,
            current_state_version_id: None,
            drift_detection_enabled: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The path of the group containing this workspace.
    pub fn group_path(&self) -> &str {
        parent_path(&self.full_path).unwrap_or("")
    }
}
