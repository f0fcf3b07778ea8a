//! GitHub adapter: REST API and OAuth app endpoints.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;

use elysium_core::models::{VcsEventType, VcsProviderKind};
use elysium_core::{ElysiumError, Result};

use super::{
    build_http_client, error_for_status, request_err, AccessTokenInput, AuthorizationUrlInput,
    CreateWebhookInput, OAuthTokenPayload, ProjectPayload, TokenGrant, VcsAdapter,
};

const DEFAULT_GITHUB_URL: &str = "https://api.github.com";

const GITHUB_API_VERSION: &str = "2022-11-28";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Scopes requested during authorization. GitHub OAuth apps have no
/// read-only variant of `repo`, so the read-only flag is ignored.
const OAUTH_SCOPES: &str = "repo read:user";

/// Default merge-request (pull request) actions that trigger runs.
const DEFAULT_MR_ACTIONS: &[&str] = &["opened", "synchronize", "reopened"];

#[derive(Debug, Deserialize)]
struct GitHubTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubFile {
    filename: String,
    previous_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubCommitResponse {
    files: Option<Vec<GitHubFile>>,
}

#[derive(Debug, Deserialize)]
struct GitHubWebhook {
    id: i64,
}

/// GitHub host adapter.
pub struct GitHubAdapter {
    client: reqwest::Client,
    supported_mr_actions: Vec<String>,
}

impl GitHubAdapter {
    /// Creates a new GitHub adapter with the default action set.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            supported_mr_actions: DEFAULT_MR_ACTIONS.iter().map(|a| a.to_string()).collect(),
        })
    }

    /// Overrides the pull-request actions that trigger runs.
    pub fn with_supported_mr_actions(mut self, actions: Vec<String>) -> Self {
        self.supported_mr_actions = actions;
        self
    }

    fn api_base(provider_url: &str) -> String {
        provider_url.trim_end_matches('/').to_string()
    }

    fn request(&self, builder: reqwest::RequestBuilder, access_token: &str) -> reqwest::RequestBuilder {
        builder
            .header("Accept", GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .bearer_auth(access_token)
    }

    fn collect_paths(files: Option<Vec<GitHubFile>>) -> HashSet<String> {
        let mut paths = HashSet::new();
        for file in files.unwrap_or_default() {
            if let Some(previous) = file.previous_filename {
                paths.insert(previous);
            }
            paths.insert(file.filename);
        }
        paths
    }
}

#[async_trait]
impl VcsAdapter for GitHubAdapter {
    fn kind(&self) -> VcsProviderKind {
        VcsProviderKind::GitHub
    }

    fn default_url(&self) -> &'static str {
        DEFAULT_GITHUB_URL
    }

    fn merge_request_action_supported(&self, action: &str) -> bool {
        self.supported_mr_actions.iter().any(|a| a == action)
    }

    fn to_event_type(&self, event_header: &str, git_ref: &str) -> Option<VcsEventType> {
        match event_header {
            "push" => {
                if git_ref.starts_with("refs/heads/") {
                    Some(VcsEventType::Branch)
                } else if git_ref.starts_with("refs/tags/") {
                    Some(VcsEventType::Tag)
                } else {
                    None
                }
            }
            "pull_request" => Some(VcsEventType::MergeRequest),
            _ => None,
        }
    }

    fn build_oauth_authorization_url(&self, input: &AuthorizationUrlInput<'_>) -> String {
        format!(
            "{}/login/oauth/authorize?client_id={}&redirect_uri={}&response_type=code&state={}&scope={}",
            input.provider_url.trim_end_matches('/'),
            urlencoding::encode(input.client_id),
            urlencoding::encode(input.redirect_uri),
            urlencoding::encode(input.state),
            urlencoding::encode(OAUTH_SCOPES)
        )
    }

    fn build_repository_url(&self, provider_url: &str, repository_path: &str) -> String {
        let base = provider_url.trim_end_matches('/');
        // The API host is not browsable; map the hosted service to its web
        // host and leave enterprise installs alone.
        if base == DEFAULT_GITHUB_URL {
            format!("https://github.com/{}", repository_path)
        } else {
            format!("{}/{}", base, repository_path)
        }
    }

    fn webhook_token_in_url(&self) -> bool {
        true
    }

    async fn test_connection(&self, provider_url: &str, access_token: &str) -> Result<()> {
        let url = format!("{}/user", Self::api_base(provider_url));
        let response = self
            .request(self.client.get(&url), access_token)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        error_for_status("GitHub", response).await?;
        Ok(())
    }

    async fn get_project(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
    ) -> Result<ProjectPayload> {
        let url = format!("{}/repos/{}", Self::api_base(provider_url), repository_path);
        let response = self
            .request(self.client.get(&url), access_token)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        let repo: GitHubRepository = error_for_status("GitHub", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse repository response: {}", e))
            })?;

        Ok(ProjectPayload {
            default_branch: repo.default_branch,
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
            "{}/repos/{}/commits/{}",
            Self::api_base(provider_url),
            repository_path,
            urlencoding::encode(git_ref)
        );
        let response = self
            .request(self.client.get(&url), access_token)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        let commit: GitHubCommitResponse = error_for_status("GitHub", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse commit response: {}", e))
            })?;

        Ok(Self::collect_paths(commit.files))
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
            "{}/repos/{}/compare/{}...{}",
            Self::api_base(provider_url),
            repository_path,
            urlencoding::encode(base),
            urlencoding::encode(head)
        );
        let response = self
            .request(self.client.get(&url), access_token)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        let compare: GitHubCommitResponse = error_for_status("GitHub", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse compare response: {}", e))
            })?;

        Ok(Self::collect_paths(compare.files))
    }

    async fn get_archive(
        &self,
        provider_url: &str,
        access_token: &str,
        repository_path: &str,
        git_ref: &str,
    ) -> Result<reqwest::Response> {
        let url = format!(
            "{}/repos/{}/tarball/{}",
            Self::api_base(provider_url),
            repository_path,
            urlencoding::encode(git_ref)
        );
        let response = self
            .request(self.client.get(&url), access_token)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        error_for_status("GitHub", response).await
    }

    async fn create_access_token(
        &self,
        input: &AccessTokenInput<'_>,
    ) -> Result<OAuthTokenPayload> {
        let url = format!(
            "{}/login/oauth/access_token",
            input.provider_url.trim_end_matches('/')
        );

        let mut params = vec![
            ("client_id", input.client_id),
            ("client_secret", input.client_secret),
        ];
        match input.grant {
            TokenGrant::AuthorizationCode { code, redirect_uri } => {
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
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        let token: GitHubTokenResponse = error_for_status("GitHub", response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ElysiumError::ProviderRequest(format!("Failed to parse token response: {}", e))
            })?;

        // OAuth app tokens carry no refresh token or expiry; tolerate both.
        let expires_at = token
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));

        Ok(OAuthTokenPayload {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }

    async fn create_webhook(&self, input: &CreateWebhookInput<'_>) -> Result<String> {
        let url = format!(
            "{}/repos/{}/hooks",
            Self::api_base(input.provider_url),
            input.repository_path
        );
        // GitHub has no token field; the auth token is already embedded in
        // the webhook URL as a query parameter.
        let body = serde_json::json!({
            "name": "web",
            "config": {
                "url": input.webhook_url,
                "content_type": "json",
                "insecure_ssl": 0,
            },
            "events": ["push", "pull_request"],
            "active": true,
        });
        let response = self
            .request(self.client.post(&url), input.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        let webhook: GitHubWebhook = error_for_status("GitHub", response)
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
            "{}/repos/{}/hooks/{}",
            Self::api_base(provider_url),
            repository_path,
            webhook_id
        );
        let response = self
            .request(self.client.delete(&url), access_token)
            .send()
            .await
            .map_err(|e| request_err("GitHub", e))?;

        error_for_status("GitHub", response).await?;
        Ok(())
    }
}
