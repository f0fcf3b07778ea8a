//! Run triggers: manual VCS runs and webhook event ingestion.

use elysium_core::db::event::VcsEventRepo;
use elysium_core::db::link::LinkRepo;
use elysium_core::db::namespace::WorkspaceRepo;
use elysium_core::models::{VcsEvent, VcsEventType, WorkspaceId};
use elysium_core::{ElysiumError, Result};

use super::VcsService;
use crate::auth::{Caller, Permission};
use crate::events::refs::{is_zero_hash, looks_like_commit_hash, ref_matches, strip_ref_prefix};
use crate::events::{EventExecution, WebhookEventInput};

/// Input for manually triggering a run from the linked repository.
#[derive(Debug, Clone)]
pub struct CreateVcsRunInput {
    pub workspace_id: WorkspaceId,
    /// Branch, tag, or commit hash; the link's tracked branch when absent.
    pub git_ref: Option<String>,
    pub is_destroy: bool,
}

impl VcsService {
    /// Triggers a run from the workspace's linked repository.
    pub async fn create_vcs_run(
        &self,
        caller: &Caller,
        input: CreateVcsRunInput,
    ) -> Result<VcsEvent> {
        let workspace = WorkspaceRepo::get_by_id(&self.db, &input.workspace_id)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound(format!("workspace {} not found", input.workspace_id))
            })?;

        self.authorizer
            .require_workspace_permission(caller, Permission::CreateRun, &workspace.full_path)
            .await?;

        let link = LinkRepo::get_by_workspace(&self.db, &workspace.id)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound(format!(
                    "workspace {} has no VCS provider link",
                    workspace.full_path
                ))
            })?;

        let mut provider = self.get_vcs_provider(&link.provider_id).await?;
        let access_token = self.refresh_oauth_token(&mut provider, false).await?;
        let adapter = self.adapters.get(provider.kind)?;

        let reference = input
            .git_ref
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| link.branch.clone());
        let (source_ref, commit_id) = if looks_like_commit_hash(&reference) {
            (None, Some(reference.clone()))
        } else {
            (Some(reference.clone()), None)
        };

        let repository_url = adapter.build_repository_url(&provider.url, &link.repository_path);
        let event = VcsEvent::new(
            workspace.id.clone(),
            VcsEventType::Manual,
            source_ref,
            commit_id.clone(),
            repository_url,
        );
        VcsEventRepo::create(&self.db, &event).await?;

        let execution = EventExecution {
            event_id: event.id.clone(),
            workspace_id: workspace.id.clone(),
            link,
            provider_kind: provider.kind,
            provider_url: provider.url.clone(),
            access_token,
            event_type: VcsEventType::Manual,
            fetch_ref: reference,
            diff_before: None,
            diff_after: commit_id,
            is_destroy: input.is_destroy,
            created_by: caller.display_name(),
        };
        self.executor.dispatch(&self.tasks, execution);

        Ok(event)
    }

    /// Ingests a webhook delivery for the calling link.
    ///
    /// Unrecognized events, filtered refs, and no-op pushes return `None`
    /// without error so the host never marks the webhook as broken.
    pub async fn process_webhook_event(
        &self,
        caller: &Caller,
        input: WebhookEventInput,
    ) -> Result<Option<VcsEvent>> {
        let Caller::VcsLink { link_id } = caller else {
            return Err(ElysiumError::Unauthorized(
                "webhook events require a VCS-link caller".to_string(),
            ));
        };

        let link = LinkRepo::get_by_id(&self.db, link_id)
            .await?
            .ok_or_else(|| ElysiumError::NotFound(format!("link {} not found", link_id)))?;

        let workspace = WorkspaceRepo::get_by_id(&self.db, &link.workspace_id)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound(format!("workspace {} not found", link.workspace_id))
            })?;

        self.authorizer
            .require_workspace_permission(caller, Permission::CreateRun, &workspace.full_path)
            .await?;

        let mut provider = self.get_vcs_provider(&link.provider_id).await?;
        let adapter = self.adapters.get(provider.kind)?;

        let Some(event_type) =
            adapter.to_event_type(&input.event_header, input.git_ref.as_deref().unwrap_or(""))
        else {
            tracing::debug!(
                "Ignoring unrecognized webhook event {} for link {}",
                input.event_header,
                link.id
            );
            return Ok(None);
        };

        if !ref_matches(&input, event_type, &link, adapter.as_ref()) {
            tracing::debug!(
                "Webhook event {} for link {} does not match the link filters",
                input.event_header,
                link.id
            );
            return Ok(None);
        }

        // Ref deletions arrive as pushes with an all-zero after hash.
        if event_type != VcsEventType::MergeRequest
            && input.after.as_deref().map(is_zero_hash).unwrap_or(true)
        {
            return Ok(None);
        }

        let access_token = self.refresh_oauth_token(&mut provider, false).await?;

        let (source_ref, commit_id, fetch_ref) = match event_type {
            VcsEventType::MergeRequest => {
                let source_branch = input.source_branch.clone().ok_or_else(|| {
                    ElysiumError::Validation(
                        "merge request event is missing the source branch".to_string(),
                    )
                })?;
                (
                    Some(source_branch.clone()),
                    input.head_commit_id.clone(),
                    source_branch,
                )
            }
            VcsEventType::Branch => {
                let stripped = input
                    .git_ref
                    .as_deref()
                    .map(|r| strip_ref_prefix(r).to_string());
                (stripped, input.after.clone(), link.branch.clone())
            }
            VcsEventType::Tag | VcsEventType::Manual => {
                let stripped = input
                    .git_ref
                    .as_deref()
                    .map(|r| strip_ref_prefix(r).to_string())
                    .unwrap_or_default();
                (Some(stripped.clone()), input.after.clone(), stripped)
            }
        };

        let repository_url = adapter.build_repository_url(&provider.url, &link.repository_path);
        let event = VcsEvent::new(
            workspace.id.clone(),
            event_type,
            source_ref,
            commit_id.clone(),
            repository_url,
        );
        VcsEventRepo::create(&self.db, &event).await?;

        let diff_before = input.before.clone().filter(|b| !is_zero_hash(b));
        let execution = EventExecution {
            event_id: event.id.clone(),
            workspace_id: workspace.id.clone(),
            link,
            provider_kind: provider.kind,
            provider_url: provider.url.clone(),
            access_token,
            event_type,
            fetch_ref,
            diff_before,
            diff_after: commit_id,
            is_destroy: false,
            created_by: caller.display_name(),
        };
        self.executor.dispatch(&self.tasks, execution);

        Ok(Some(event))
    }

    /// Authenticates a webhook delivery token, returning the link-scoped
    /// caller. The token's `jti` must match the link's stored nonce;
    /// deleting the link revokes every outstanding token.
    pub async fn verify_webhook_token(&self, token: &str) -> Result<Caller> {
        let claims = self.token_signer.verify(token)?;

        let link_id = elysium_core::models::LinkId::from_string(&claims.sub)
            .map_err(|_| ElysiumError::Unauthorized("Invalid link ID in token".to_string()))?;
        let link = LinkRepo::get_by_id(&self.db, &link_id)
            .await?
            .ok_or_else(|| ElysiumError::Unauthorized("Token link no longer exists".to_string()))?;

        if claims.jti != link.token_nonce.to_string() {
            return Err(ElysiumError::Unauthorized(
                "Webhook token has been revoked".to_string(),
            ));
        }

        Ok(Caller::VcsLink { link_id })
    }
}
