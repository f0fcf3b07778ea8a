//! VCS provider model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

use super::GroupId;

/// Unique identifier for a VCS provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VcsProviderId(pub Ulid);

impl VcsProviderId {
    /// Creates a new random provider ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a provider ID from a string.
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for VcsProviderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VcsProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Ulid> for VcsProviderId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

/// Supported VCS hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsProviderKind {
    GitLab,
    GitHub,
}

impl VcsProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsProviderKind::GitLab => "gitlab",
            VcsProviderKind::GitHub => "github",
        }
    }
}

impl std::fmt::Display for VcsProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VcsProviderKind {
    type Err = crate::ElysiumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gitlab" => Ok(VcsProviderKind::GitLab),
            "github" => Ok(VcsProviderKind::GitHub),
            _ => Err(crate::ElysiumError::Validation(format!(
                "Unsupported VCS provider kind: {}",
                s
            ))),
        }
    }
}

/// A configured VCS provider anchoring an OAuth credential to a host.
///
/// `oauth_state` is set while an authorization round-trip is pending and
/// cleared once the code exchange succeeds; `oauth_access_token` is only
/// ever set after a successful exchange. Refresh token and expiry travel
/// together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsProvider {
    pub id: VcsProviderId,
    pub name: String,
    pub description: String,
    pub group_id: GroupId,
    /// Full resource path, `{group_path}/{name}`.
    pub resource_path: String,
    /// Host base URL with any trailing slash stripped.
    pub url: String,
    pub kind: VcsProviderKind,
    pub oauth_client_id: String,
    #[serde(skip_serializing)]
    pub oauth_client_secret: String,
    pub oauth_state: Option<Uuid>,
    #[serde(skip_serializing)]
    pub oauth_access_token: Option<String>,
    #[serde(skip_serializing)]
    pub oauth_refresh_token: Option<String>,
    pub oauth_token_expires_at: Option<DateTime<Utc>>,
    /// When true the service provisions webhooks; otherwise the user wires
    /// them manually.
    pub auto_create_webhooks: bool,
    /// Request read-write API scopes during authorization. GitHub ignores
    /// this and always asks for `repo read:user`.
    pub read_write_scope: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VcsProvider {
    /// True once the OAuth flow has completed and an access token is stored.
    pub fn oauth_complete(&self) -> bool {
        self.oauth_access_token.is_some()
    }

    /// The path of the group owning this provider.
    pub fn group_path(&self) -> &str {
        match self.resource_path.rfind('/') {
            Some(idx) => &self.resource_path[..idx],
            None => &self.resource_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        assert_eq!("gitlab".parse::<VcsProviderKind>().unwrap(), VcsProviderKind::GitLab);
        assert_eq!("GitHub".parse::<VcsProviderKind>().unwrap(), VcsProviderKind::GitHub);
        assert_eq!(VcsProviderKind::GitLab.as_str(), "gitlab");
        assert!("bitbucket".parse::<VcsProviderKind>().is_err());
    }

    #[test]
    fn test_id_round_trip() {
        let id = VcsProviderId::new();
        let parsed = VcsProviderId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }
}
