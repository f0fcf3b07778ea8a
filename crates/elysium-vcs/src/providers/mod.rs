//! VCS host adapters.
//!
//! Each supported host implements [`VcsAdapter`]; the registry resolves the
//! adapter for a provider's kind. Adapters are immutable after construction
//! and safe to share across tasks.

pub mod github;
pub mod gitlab;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use elysium_core::models::{VcsEventType, VcsProviderKind};
use elysium_core::{ElysiumError, Result};

pub use github::GitHubAdapter;
pub use gitlab::GitLabAdapter;

/// Default HTTP timeout for adapter calls.
const HTTP_TIMEOUT_SECS: u64 = 30;

/// User agent sent on every adapter request.
const USER_AGENT: &str = concat!("elysium-vcs/", env!("CARGO_PKG_VERSION"));

/// Tokens returned by a host's OAuth endpoint.
#[derive(Debug, Clone)]
pub struct OAuthTokenPayload {
    pub access_token: String,
    /// GitHub OAuth apps issue no refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Project metadata used to validate a repository link.
#[derive(Debug, Clone)]
pub struct ProjectPayload {
    pub default_branch: Option<String>,
}

/// Which OAuth grant to exchange.
#[derive(Debug, Clone, Copy)]
pub enum TokenGrant<'a> {
    AuthorizationCode {
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        refresh_token: &'a str,
    },
}

/// Input for [`VcsAdapter::create_access_token`].
#[derive(Debug, Clone)]
pub struct AccessTokenInput<'a> {
    pub provider_url: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant: TokenGrant<'a>,
}

/// Input for [`VcsAdapter::build_oauth_authorization_url`].
#[derive(Debug, Clone)]
pub struct AuthorizationUrlInput<'a> {
    pub provider_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    /// Request read-write API scopes. GitHub ignores this flag.
    pub read_write_scope: bool,
}

/// Input for [`VcsAdapter::create_webhook`].
#[derive(Debug, Clone)]
pub struct CreateWebhookInput<'a> {
    pub provider_url: &'a str,
    pub access_token: &'a str,
    pub repository_path: &'a str,
    /// Ingress URL the host will deliver events to. For hosts that embed
    /// the auth token in the URL, the token is already appended.
    pub webhook_url: &'a str,
    /// Raw webhook token, for hosts that accept a separate token field.
    pub webhook_token: &'a str,
}

/// Capability set every supported VCS host implements.
#[async_trait]
pub trait VcsAdapter: Send + Sync {
    /// The host kind this adapter serves.
    fn kind(&self) -> VcsProviderKind;

    /// Base URL used when a provider is created without one.
    fn default_url(&self) -> &'static str;

    /// Whether a merge-request action should trigger a run. Unsupported
    /// actions drop silently.
    fn merge_request_action_supported(&self, action: &str) -> bool;

    /// Translates a host-native event signal into an event type. `None`
    /// means the event is ignored (the caller still answers the host with
    /// success).
    fn to_event_type(&self, event_header: &str, git_ref: &str) -> Option<VcsEventType>;

    /// Builds the user-facing OAuth authorization URL.
    fn build_oauth_authorization_url(&self, input: &AuthorizationUrlInput<'_>) -> String;

    /// Builds the browsable URL of a repository.
    fn build_repository_url(&self, provider_url: &str, repository_path: &str) -> String;

    /// True when the host delivers the webhook auth token as a `?token=`
    /// query parameter on the webhook URL rather than a dedicated field.
    fn webhook_token_in_url(&self) -> bool;

    /// Verifies the access token by fetching the authenticated user.
    async fn test_connection(&self, provider_url: &str, access_token: &str) -> Result<()>;

    /// Fetches project metadata for a repository path.
    async fn get_project(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
    ) -> Result<ProjectPayload>;

    /// Returns the set of file paths altered by a single ref. Old and new
    /// paths of renames are both included.
    async fn get_diff(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        git_ref: &str,
    ) -> Result<std::collections::HashSet<String>>;

    /// Returns the set of file paths altered between two refs.
    async fn get_diffs(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        base: &str,
        head: &str,
    ) -> Result<std::collections::HashSet<String>>;

    /// Opens a streaming download of the repository tar.gz archive at a ref.
    async fn get_archive(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        git_ref: &str,
    ) -> Result<reqwest::Response>;

    /// Exchanges an authorization code or refresh token for access tokens.
    async fn create_access_token(
        &self,
        input: &AccessTokenInput<'_>,
    ) -> Result<OAuthTokenPayload>;

    /// Creates a webhook on the repository, returning the remote webhook ID.
    async fn create_webhook(&self, input: &CreateWebhookInput<'_>) -> Result<String>;

    /// Deletes a webhook from the repository.
    async fn delete_webhook(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        webhook_id: &str,
    ) -> Result<()>;
}

/// Resolves adapters by provider kind. Constructed once at startup.
pub struct AdapterRegistry {
    adapters: HashMap<VcsProviderKind, Arc<dyn VcsAdapter>>,
}

impl AdapterRegistry {
    /// Creates a registry with the built-in GitLab and GitHub adapters.
    pub fn new() -> Result<Self> {
        let mut adapters: HashMap<VcsProviderKind, Arc<dyn VcsAdapter>> = HashMap::new();
        adapters.insert(VcsProviderKind::GitLab, Arc::new(GitLabAdapter::new()?));
        adapters.insert(VcsProviderKind::GitHub, Arc::new(GitHubAdapter::new()?));
        Ok(Self { adapters })
    }

    /// Registers or replaces an adapter, for pluggable host additions.
    pub fn with_adapter(mut self, adapter: Arc<dyn VcsAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Looks up the adapter for a provider kind.
    pub fn get(&self, kind: VcsProviderKind) -> Result<Arc<dyn VcsAdapter>> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| {
                ElysiumError::Validation(format!("Unsupported VCS provider kind: {}", kind))
            })
    }
}

/// Builds the shared HTTP client adapters use.
pub(crate) fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ElysiumError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Maps a transport failure into the provider-request error.
pub(crate) fn request_err(host: &str, e: reqwest::Error) -> ElysiumError {
    ElysiumError::ProviderRequest(format!("{} request failed: {}", host, e))
}

/// Fails non-2xx responses with the upstream status and body.
pub(crate) async fn error_for_status(
    host: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ElysiumError::Upstream {
        status,
        message: format!("{}: {}", host, body),
    })
}
