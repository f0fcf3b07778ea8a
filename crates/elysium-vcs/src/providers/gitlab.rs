//! GitLab adapter: v4 REST API and OAuth endpoints.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use elysium_core::models::{VcsEventType, VcsProviderKind};
use elysium_core::{ElysiumError, Result};

use super::{
    build_http_client, error_for_status, request_err, AccessTokenInput, AuthorizationUrlInput,
    CreateWebhookInput, OAuthTokenPayload, ProjectPayload, TokenGrant, VcsAdapter,
};

const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";

/// Merge-request actions that trigger runs.
const SUPPORTED_MR_ACTIONS: &[&str] = &["open", "update"];

/// Scopes requested during authorization.
const READ_WRITE_SCOPES: &str = "api read_repository";
const READ_ONLY_SCOPES: &str = "read_user read_api";

#[derive(Debug, Deserialize)]
struct GitLabTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    created_at: Option<i64>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabDiff {
    old_path: String,
    new_path: String,
}

#[derive(Debug, Deserialize)]
struct GitLabCompareResponse {
    diffs: Vec<GitLabDiff>,
}

#[derive(Debug, Deserialize)]
struct GitLabWebhook {
    id: i64,
}

/// GitLab host adapter.
pub struct GitLabAdapter {
    client: reqwest::Client,
}

impl GitLabAdapter {
    /// Creates a new GitLab adapter.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }

    fn api_base(provider_url: &str) -> String {
        format!("{}/api/v4", provider_url.trim_end_matches('/'))
    }

    /// GitLab addresses projects by their URL-escaped full path.
    fn escaped_project(repository_path: &str) -> String {
        urlencoding::encode(repository_path).into_owned()
    }

    fn collect_paths(diffs: &[GitLabDiff]) -> HashSet<String> {
        let mut paths = HashSet::new();
        for diff in diffs {
            paths.insert(diff.old_path.clone());
            paths.insert(diff.new_path.clone());
        }
        paths
    }
}

#[async_trait]
impl VcsAdapter for GitLabAdapter {
    fn kind(&self) -> VcsProviderKind {
        VcsProviderKind::GitLab
    }

    fn default_url(&self) -> &'static str {
        DEFAULT_GITLAB_URL
    }

    fn merge_request_action_supported(&self, action: &str) -> bool {
        SUPPORTED_MR_ACTIONS.contains(&action)
    }

    fn to_event_type(&self, event_header: &str, _git_ref: &str) -> Option<VcsEventType> {
        match event_header {
            "Push Hook" => Some(VcsEventType::Branch),
            "Tag Push Hook" => Some(VcsEventType::Tag),
            "Merge Request Hook" => Some(VcsEventType::MergeRequest),
            _ => None,
        }
    }

    fn build_oauth_authorization_url(&self, input: &AuthorizationUrlInput<'_>) -> String {
        let scopes = if input.read_write_scope {
            READ_WRITE_SCOPES
        } else {
            READ_ONLY_SCOPES
        };
        format!(
            "{}/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&state={}&scope={}",
            input.provider_url.trim_end_matches('/'),
            urlencoding::encode(input.client_id),
            urlencoding::encode(input.redirect_uri),
            urlencoding::encode(input.state),
            urlencoding::encode(scopes)
        )
    }

    fn build_repository_url(&self, provider_url: &str, repository_path: &str) -> String {
        format!("{}/{}", provider_url.trim_end_matches('/'), repository_path)
    }

    fn webhook_token_in_url(&self) -> bool {
        false
    }

    async fn test_connection(&self, provider_url: &str, access_token: &str) -> Result<()> {
        let url = format!("{}/user", Self::api_base(provider_url));
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        error_for_status("GitLab", response).await?;
        Ok(())
    }

    async fn get_project(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
    ) -> Result<ProjectPayload> {
        let url = format!(
            "{}/projects/{}",
            Self::api_base(provider_url),
            Self::escaped_project(repository_path)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        let project: GitLabProject = error_for_status("GitLab", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse project response: {}", e))
            })?;

        Ok(ProjectPayload {
            default_branch: project.default_branch,
        })
    }

    async fn get_diff(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        git_ref: &str,
    ) -> Result<HashSet<String>> {
        let url = format!(
            "{}/projects/{}/repository/commits/{}/diff",
            Self::api_base(provider_url),
            Self::escaped_project(repository_path),
            urlencoding::encode(git_ref)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        let diffs: Vec<GitLabDiff> = error_for_status("GitLab", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse diff response: {}", e))
            })?;

        Ok(Self::collect_paths(&diffs))
    }

    async fn get_diffs(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        base: &str,
        head: &str,
    ) -> Result<HashSet<String>> {
        let url = format!(
            "{}/projects/{}/repository/compare?from={}&to={}",
            Self::api_base(provider_url),
            Self::escaped_project(repository_path),
            urlencoding::encode(base),
            urlencoding::encode(head)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        let compare: GitLabCompareResponse = error_for_status("GitLab", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse compare response: {}", e))
            })?;

        Ok(Self::collect_paths(&compare.diffs))
    }

    async fn get_archive(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        git_ref: &str,
    ) -> Result<reqwest::Response> {
        let url = format!(
            "{}/projects/{}/repository/archive.tar.gz?sha={}",
            Self::api_base(provider_url),
            Self::escaped_project(repository_path),
            urlencoding::encode(git_ref)
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        error_for_status("GitLab", response).await
    }

    async fn create_access_token(
        &self,
        input: &AccessTokenInput<'_>,
    ) -> Result<OAuthTokenPayload> {
        let url = format!("{}/oauth/token", input.provider_url.trim_end_matches('/'));

        let mut params = vec![
            ("client_id", input.client_id),
            ("client_secret", input.client_secret),
        ];
        match input.grant {
            TokenGrant::AuthorizationCode { code, redirect_uri } => {
                params.push(("grant_type", "authorization_code"));
                params.push(("code", code));
                params.push(("redirect_uri", redirect_uri));
            }
            TokenGrant::RefreshToken { refresh_token } => {
                params.push(("grant_type", "refresh_token"));
                params.push(("refresh_token", refresh_token));
            }
        }

        let response = self
            .client
            .post(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        let token: GitLabTokenResponse = error_for_status("GitLab", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse token response: {}", e))
            })?;

        let expires_at = match (token.created_at, token.expires_in) {
            (Some(created_at), Some(expires_in)) => DateTime::<Utc>::from_timestamp(created_at, 0)
                .map(|t| t + Duration::seconds(expires_in)),
            (None, Some(expires_in)) => Some(Utc::now() + Duration::seconds(expires_in)),
            _ => None,
        };

        Ok(OAuthTokenPayload {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }

    async fn create_webhook(&self, input: &CreateWebhookInput<'_>) -> Result<String> {
        let url = format!(
            "{}/projects/{}/hooks",
            Self::api_base(input.provider_url),
            Self::escaped_project(input.repository_path)
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(input.access_token)
            .form(&[
                ("url", input.webhook_url),
                ("token", input.webhook_token),
                ("push_events", "true"),
                ("tag_push_events", "true"),
                ("merge_requests_events", "true"),
            ])
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        let webhook: GitLabWebhook = error_for_status("GitLab", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse webhook response: {}", e))
            })?;

        Ok(webhook.id.to_string())
    }

    async fn delete_webhook(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        webhook_id: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/projects/{}/hooks/{}",
            Self::api_base(provider_url),
            Self::escaped_project(repository_path),
            webhook_id
        );
        let response = self
            .client
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_err("GitLab", e))?;

        error_for_status("GitLab", response).await?;
        Ok(())
    }
}
