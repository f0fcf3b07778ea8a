//! Caller identity, permission checks, and webhook token signing.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use elysium_core::models::{LinkId, UserId};
use elysium_core::{ElysiumError, Result};

/// Token type claim for link-scoped webhook tokens.
const VCS_LINK_TOKEN_TYPE: &str = "vcs-link";

/// The identity a service operation runs as.
#[derive(Debug, Clone)]
pub enum Caller {
    /// A human or machine user authenticated by the auth layer.
    User { user_id: UserId, username: String },
    /// A webhook delivery authenticated by a link-scoped token.
    VcsLink { link_id: LinkId },
    /// Internal platform machinery.
    System { name: String },
}

impl Caller {
    /// Identity string recorded against activity events and runs.
    pub fn display_name(&self) -> String {
        match self {
            Caller::User { username, .. } => username.clone(),
            Caller::VcsLink { link_id } => format!("vcs-link/{}", link_id),
            Caller::System { name } => name.clone(),
        }
    }
}

/// Permissions the VCS service checks before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    CreateVcsProvider,
    UpdateVcsProvider,
    DeleteVcsProvider,
    UpdateWorkspace,
    CreateRun,
}

/// Authorization collaborator.
///
/// Implementations resolve the caller's membership and roles; this crate
/// only asks yes/no questions. A missing caller maps to Unauthorized and a
/// denial to Forbidden.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Requires `permission` on the group at `group_path`.
    async fn require_group_permission(
        &self,
        caller: &Caller,
        permission: Permission,
        group_path: &str,
    ) -> Result<()>;

    /// Requires `permission` on the workspace at `workspace_path`.
    async fn require_workspace_permission(
        &self,
        caller: &Caller,
        permission: Permission,
        workspace_path: &str,
    ) -> Result<()>;
}

/// Claims carried by a signed webhook token.
///
/// `jti` mirrors the link's stored token nonce; rotating the nonce (by
/// deleting the link) revokes every outstanding token.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookTokenClaims {
    /// The globally-identified link ID.
    pub sub: String,
    #[serde(rename = "typ")]
    pub token_type: String,
    pub jti: String,
    pub iat: i64,
}

/// Signs and verifies link-scoped webhook tokens.
pub struct WebhookTokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl WebhookTokenSigner {
    /// Creates a signer from the shared HMAC secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Mints a token bound to a link and its current nonce. The token does
    /// not expire; revocation is by deleting the link.
    pub fn sign(&self, link_id: &LinkId, nonce: &Uuid) -> Result<String> {
        let claims = WebhookTokenClaims {
            sub: link_id.to_string(),
            token_type: VCS_LINK_TOKEN_TYPE.to_string(),
            jti: nonce.to_string(),
            iat: chrono::Utc::now().timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ElysiumError::Internal(format!("Failed to sign webhook token: {}", e)))
    }

    /// Verifies a token's signature and type, returning its claims.
    ///
    /// The caller must still compare `jti` against the link's stored nonce.
    pub fn verify(&self, token: &str) -> Result<WebhookTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<WebhookTokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| ElysiumError::Unauthorized(format!("Invalid webhook token: {}", e)))?;

        if data.claims.token_type != VCS_LINK_TOKEN_TYPE {
            return Err(ElysiumError::Unauthorized(format!(
                "Unexpected token type: {}",
                data.claims.token_type
            )));
        }

        Ok(data.claims)
    }
}
