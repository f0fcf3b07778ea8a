//! Workspace to repository link operations.

use chrono::Utc;
use regex_lite::Regex;
use uuid::Uuid;

use elysium_core::db::link::LinkRepo;
use elysium_core::db::namespace::WorkspaceRepo;
use elysium_core::db::provider::VcsProviderRepo;
use elysium_core::models::{
    expand_path, ActivityAction, ActivityEvent, LinkId, VcsProviderId, WorkspaceId,
    WorkspaceVcsProviderLink,
};
use elysium_core::{ElysiumError, Result};

use super::VcsService;
use crate::auth::{Caller, Permission};
use crate::providers::CreateWebhookInput;

/// Input for linking a workspace to a repository.
#[derive(Debug, Clone)]
pub struct CreateLinkInput {
    pub workspace_id: WorkspaceId,
    pub provider_id: VcsProviderId,
    /// Repository path in `owner/repo` form.
    pub repository_path: String,
    /// Branch to track; the repository default branch when absent.
    pub branch: Option<String>,
    pub module_directory: Option<String>,
    pub tag_regex: Option<String>,
    pub glob_patterns: Vec<String>,
    pub auto_speculative_plan: bool,
    pub webhook_disabled: bool,
}

/// A created link plus what the caller needs to wire the webhook.
///
/// Exactly one of `webhook_url` and `webhook_token` is set: the URL with
/// embedded token for hosts that carry the token as a query parameter
/// (GitHub), the raw token for hosts with a dedicated token field (GitLab).
#[derive(Debug, Clone)]
pub struct CreateLinkResponse {
    pub link: WorkspaceVcsProviderLink,
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
}

impl VcsService {
    /// Links a workspace to a repository, validating the repository against
    /// the host and provisioning the webhook when the provider auto-creates
    /// them.
    pub async fn create_workspace_vcs_provider_link(
        &self,
        caller: &Caller,
        input: CreateLinkInput,
    ) -> Result<CreateLinkResponse> {
        let workspace = WorkspaceRepo::get_by_id(&self.db, &input.workspace_id)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound(format!("workspace {} not found", input.workspace_id))
            })?;

        self.authorizer
            .require_workspace_permission(caller, Permission::UpdateWorkspace, &workspace.full_path)
            .await?;

        let mut provider = self.get_vcs_provider(&input.provider_id).await?;
        if !provider.oauth_complete() {
            return Err(ElysiumError::Validation(format!(
                "VCS provider {} has not completed OAuth",
                provider.resource_path
            )));
        }

        // The provider's owning group must sit on the workspace's ancestor
        // chain.
        let provider_group = provider.group_path();
        let on_chain = expand_path(workspace.group_path())
            .iter()
            .any(|p| p == provider_group);
        if !on_chain {
            return Err(ElysiumError::Validation(format!(
                "VCS provider group {} is not an ancestor of workspace {}",
                provider_group, workspace.full_path
            )));
        }

        if input.repository_path.split('/').count() < 2 {
            return Err(ElysiumError::Validation(format!(
                "Repository path must be in owner/repo form: {}",
                input.repository_path
            )));
        }

        for pattern in &input.glob_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                ElysiumError::Validation(format!("Invalid glob pattern {}: {}", pattern, e))
            })?;
        }
        if let Some(tag_regex) = input.tag_regex.as_deref().filter(|r| !r.is_empty()) {
            Regex::new(tag_regex).map_err(|e| {
                ElysiumError::Validation(format!("Invalid tag regex {}: {}", tag_regex, e))
            })?;
        }

        let module_directory = clean_module_directory(input.module_directory.as_deref())?;

        let access_token = self.refresh_oauth_token(&mut provider, false).await?;
        let adapter = self.adapters.get(provider.kind)?;
        let project = adapter
            .get_project(&provider.url, &access_token, &input.repository_path)
            .await?;

        let branch = input
            .branch
            .filter(|b| !b.is_empty())
            .or(project.default_branch)
            .ok_or_else(|| {
                ElysiumError::Validation(format!(
                    "repository {} has no default branch; specify one",
                    input.repository_path
                ))
            })?;

        let now = Utc::now();
        let mut link = WorkspaceVcsProviderLink {
            id: LinkId::new(),
            provider_id: provider.id.clone(),
            workspace_id: workspace.id.clone(),
            repository_path: input.repository_path.clone(),
            branch,
            module_directory,
            tag_regex: input.tag_regex.filter(|r| !r.is_empty()),
            glob_patterns: input.glob_patterns,
            auto_speculative_plan: input.auto_speculative_plan,
            webhook_disabled: input.webhook_disabled,
            webhook_id: None,
            token_nonce: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        LinkRepo::create(&self.db, &link).await?;

        let webhook_token = self.token_signer.sign(&link.id, &link.token_nonce)?;
        let webhook_url = if adapter.webhook_token_in_url() {
            format!("{}?token={}", self.config.webhook_url(), webhook_token)
        } else {
            self.config.webhook_url()
        };

        if provider.auto_create_webhooks && !link.webhook_disabled {
            let webhook_id = adapter
                .create_webhook(&CreateWebhookInput {
                    provider_url: &provider.url,
                    access_token: &access_token,
                    repository_path: &link.repository_path,
                    webhook_url: &webhook_url,
                    webhook_token: &webhook_token,
                })
                .await?;
            link.webhook_id = Some(webhook_id);
            LinkRepo::update(&self.db, &link).await?;
        }

        self.activity
            .record(&ActivityEvent::new(
                ActivityAction::CreateVcsProviderLink,
                &workspace.full_path,
                &caller.display_name(),
            ))
            .await?;

        let response = if adapter.webhook_token_in_url() {
            CreateLinkResponse {
                link,
                webhook_url: Some(webhook_url),
                webhook_token: None,
            }
        } else {
            CreateLinkResponse {
                link,
                webhook_url: None,
                webhook_token: Some(webhook_token),
            }
        };
        Ok(response)
    }

    /// Gets the link for a workspace.
    pub async fn get_workspace_vcs_provider_link(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<WorkspaceVcsProviderLink>> {
        LinkRepo::get_by_workspace(&self.db, workspace_id).await
    }

    /// Lists the links referencing a provider.
    pub async fn get_links_for_provider(
        &self,
        provider_id: &VcsProviderId,
    ) -> Result<Vec<WorkspaceVcsProviderLink>> {
        LinkRepo::list_for_provider(&self.db, provider_id).await
    }

    /// Unlinks a workspace. Auto-created webhooks are removed from the host
    /// first; with `force` a failed removal is logged and the link is
    /// deleted anyway.
    pub async fn delete_workspace_vcs_provider_link(
        &self,
        caller: &Caller,
        link_id: &LinkId,
        force: bool,
    ) -> Result<()> {
        let link = LinkRepo::get_by_id(&self.db, link_id)
            .await?
            .ok_or_else(|| ElysiumError::NotFound(format!("link {} not found", link_id)))?;

        let workspace = WorkspaceRepo::get_by_id(&self.db, &link.workspace_id)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound(format!("workspace {} not found", link.workspace_id))
            })?;

        self.authorizer
            .require_workspace_permission(caller, Permission::UpdateWorkspace, &workspace.full_path)
            .await?;

        if let Some(webhook_id) = &link.webhook_id {
            let result = self.delete_remote_webhook(&link, webhook_id).await;
            if let Err(e) = result {
                if force {
                    tracing::error!(
                        "Failed to delete webhook {} for link {}: {}",
                        webhook_id,
                        link.id,
                        e
                    );
                } else {
                    return Err(e);
                }
            }
        }

        LinkRepo::delete(&self.db, &link.id).await?;

        self.activity
            .record(&ActivityEvent::new(
                ActivityAction::DeleteVcsProviderLink,
                &workspace.full_path,
                &caller.display_name(),
            ))
            .await?;

        Ok(())
    }

    async fn delete_remote_webhook(
        &self,
        link: &WorkspaceVcsProviderLink,
        webhook_id: &str,
    ) -> Result<()> {
        let mut provider = self.get_vcs_provider(&link.provider_id).await?;
        let access_token = self.refresh_oauth_token(&mut provider, false).await?;
        let adapter = self.adapters.get(provider.kind)?;
        adapter
            .delete_webhook(
                &provider.url,
                &access_token,
                &link.repository_path,
                webhook_id,
            )
            .await
    }
}

/// Cleans a module directory path: strips surrounding slashes, drops `.`
/// segments, and rejects parent traversal.
fn clean_module_directory(raw: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(ElysiumError::Validation(format!(
                    "Module directory must not traverse upward: {}",
                    raw
                )));
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        Ok(None)
    } else {
        Ok(Some(segments.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_module_directory() {
        assert_eq!(clean_module_directory(None).unwrap(), None);
        assert_eq!(clean_module_directory(Some("/")).unwrap(), None);
        assert_eq!(
            clean_module_directory(Some("/modules/network/")).unwrap(),
            Some("modules/network".to_string())
        );
        assert_eq!(
            clean_module_directory(Some("./modules/./network")).unwrap(),
            Some("modules/network".to_string())
        );
        assert!(clean_module_directory(Some("../escape")).is_err());
    }
}
