//! The VCS service: provider lifecycle, OAuth broker, links, and run
//! triggers.

mod link;
mod trigger;

pub use link::{CreateLinkInput, CreateLinkResponse};
pub use trigger::CreateVcsRunInput;

use std::sync::Arc;

use chrono::{Duration, Utc};
use url::Url;
use uuid::Uuid;

use elysium_core::db::namespace::GroupRepo;
use elysium_core::db::provider::VcsProviderRepo;
use elysium_core::db::DbPool;
use elysium_core::models::{
    ActivityAction, ActivityEvent, GroupId, VcsProvider, VcsProviderId, VcsProviderKind,
};
use elysium_core::{ElysiumError, Result};

use crate::auth::{Authorizer, Caller, Permission, WebhookTokenSigner};
use crate::config::VcsConfig;
use crate::events::EventExecutor;
use crate::providers::{
    AccessTokenInput, AdapterRegistry, AuthorizationUrlInput, TokenGrant,
};
use crate::services::{ActivityLogger, ConfigurationVersionService, RunService};
use crate::tasks::AsyncTaskManager;

/// Refresh the access token this long before it expires.
const TOKEN_EXPIRATION_LEEWAY: i64 = 60;

/// Input for creating a VCS provider.
#[derive(Debug, Clone)]
pub struct CreateVcsProviderInput {
    pub group_id: GroupId,
    pub name: String,
    pub description: String,
    pub kind: VcsProviderKind,
    /// Host base URL; the adapter's default when absent.
    pub url: Option<String>,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub auto_create_webhooks: bool,
    pub read_write_scope: bool,
}

/// Input for updating a VCS provider.
#[derive(Debug, Clone, Default)]
pub struct UpdateVcsProviderInput {
    pub description: Option<String>,
    pub auto_create_webhooks: Option<bool>,
}

/// A provider plus the URL the user must visit to authorize it.
#[derive(Debug, Clone)]
pub struct VcsProviderWithAuthorizationUrl {
    pub provider: VcsProvider,
    pub oauth_authorization_url: String,
}

/// Orchestrates provider lifecycle, OAuth, links, webhooks, and runs.
pub struct VcsService {
    pub(crate) db: DbPool,
    pub(crate) config: VcsConfig,
    pub(crate) adapters: Arc<AdapterRegistry>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) activity: Arc<dyn ActivityLogger>,
    pub(crate) token_signer: Arc<WebhookTokenSigner>,
    pub(crate) tasks: AsyncTaskManager,
    pub(crate) executor: Arc<EventExecutor>,
}

impl VcsService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DbPool,
        config: VcsConfig,
        adapters: Arc<AdapterRegistry>,
        authorizer: Arc<dyn Authorizer>,
        run_service: Arc<dyn RunService>,
        config_versions: Arc<dyn ConfigurationVersionService>,
        activity: Arc<dyn ActivityLogger>,
        token_signer: Arc<WebhookTokenSigner>,
        tasks: AsyncTaskManager,
    ) -> Self {
        let executor = Arc::new(EventExecutor::new(
            db.clone(),
            adapters.clone(),
            config_versions,
            run_service,
            config.clone(),
        ));
        Self {
            db,
            config,
            adapters,
            authorizer,
            activity,
            token_signer,
            tasks,
            executor,
        }
    }

    /// The task manager tracking this service's background work.
    pub fn tasks(&self) -> &AsyncTaskManager {
        &self.tasks
    }

    /// Creates a VCS provider and returns the authorization URL to send the
    /// user to.
    pub async fn create_vcs_provider(
        &self,
        caller: &Caller,
        input: CreateVcsProviderInput,
    ) -> Result<VcsProviderWithAuthorizationUrl> {
        let group = GroupRepo::get_by_id(&self.db, &input.group_id)
            .await?
            .ok_or_else(|| ElysiumError::NotFound(format!("group {} not found", input.group_id)))?;

        self.authorizer
            .require_group_permission(caller, Permission::CreateVcsProvider, &group.full_path)
            .await?;

        if input.name.is_empty() || input.name.contains('/') {
            return Err(ElysiumError::Validation(format!(
                "Invalid provider name: {}",
                input.name
            )));
        }

        let adapter = self.adapters.get(input.kind)?;
        let url = match input.url.as_deref() {
            Some(url) => normalize_provider_url(url)?,
            None => adapter.default_url().to_string(),
        };

        let count = VcsProviderRepo::count_for_group(&self.db, &group.id).await?;
        if count >= self.config.providers_per_group_limit {
            return Err(ElysiumError::Validation(format!(
                "group {} has reached the limit of {} VCS providers",
                group.full_path, self.config.providers_per_group_limit
            )));
        }

        let now = Utc::now();
        let provider = VcsProvider {
            id: VcsProviderId::new(),
            name: input.name.clone(),
            description: input.description,
            group_id: group.id.clone(),
            resource_path: format!("{}/{}", group.full_path, input.name),
            url,
            kind: input.kind,
            oauth_client_id: input.oauth_client_id,
            oauth_client_secret: input.oauth_client_secret,
            oauth_state: Some(Uuid::new_v4()),
            oauth_access_token: None,
            oauth_refresh_token: None,
            oauth_token_expires_at: None,
            auto_create_webhooks: input.auto_create_webhooks,
            read_write_scope: input.read_write_scope,
            created_at: now,
            updated_at: now,
        };
        VcsProviderRepo::create(&self.db, &provider).await?;

        self.activity
            .record(&ActivityEvent::new(
                ActivityAction::CreateVcsProvider,
                &provider.resource_path,
                &caller.display_name(),
            ))
            .await?;

        let oauth_authorization_url = self.authorization_url(&provider)?;
        Ok(VcsProviderWithAuthorizationUrl {
            provider,
            oauth_authorization_url,
        })
    }

    /// Gets a provider by ID.
    pub async fn get_vcs_provider(&self, provider_id: &VcsProviderId) -> Result<VcsProvider> {
        VcsProviderRepo::get_by_id(&self.db, provider_id)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound(format!("VCS provider {} not found", provider_id))
            })
    }

    /// Lists a group's providers.
    pub async fn get_vcs_providers_for_group(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<VcsProvider>> {
        VcsProviderRepo::list_for_group(&self.db, group_id).await
    }

    /// Updates a provider's mutable settings.
    pub async fn update_vcs_provider(
        &self,
        caller: &Caller,
        provider_id: &VcsProviderId,
        input: UpdateVcsProviderInput,
    ) -> Result<VcsProvider> {
        let mut provider = self.get_vcs_provider(provider_id).await?;
        self.authorizer
            .require_group_permission(
                caller,
                Permission::UpdateVcsProvider,
                provider.group_path(),
            )
            .await?;

        if let Some(description) = input.description {
            provider.description = description;
        }
        if let Some(auto_create_webhooks) = input.auto_create_webhooks {
            provider.auto_create_webhooks = auto_create_webhooks;
        }
        VcsProviderRepo::update(&self.db, &provider).await?;

        self.activity
            .record(&ActivityEvent::new(
                ActivityAction::UpdateVcsProvider,
                &provider.resource_path,
                &caller.display_name(),
            ))
            .await?;

        Ok(provider)
    }

    /// Deletes a provider.
    ///
    /// Refuses while links exist unless `force` is set. Under `force`,
    /// auto-created webhooks are torn down best-effort: failures are
    /// surfaced in the log but never block the deletion.
    pub async fn delete_vcs_provider(
        &self,
        caller: &Caller,
        provider_id: &VcsProviderId,
        force: bool,
    ) -> Result<()> {
        let provider = self.get_vcs_provider(provider_id).await?;
        self.authorizer
            .require_group_permission(
                caller,
                Permission::DeleteVcsProvider,
                provider.group_path(),
            )
            .await?;

        let links =
            elysium_core::db::link::LinkRepo::list_for_provider(&self.db, &provider.id).await?;
        if !links.is_empty() && !force {
            return Err(ElysiumError::Conflict(format!(
                "VCS provider {} has {} dependent workspace links",
                provider.resource_path,
                links.len()
            )));
        }

        if provider.auto_create_webhooks && !links.is_empty() {
            let mut provider = provider.clone();
            match self.refresh_oauth_token(&mut provider, false).await {
                Ok(access_token) => {
                    let adapter = self.adapters.get(provider.kind)?;
                    for link in &links {
                        let Some(webhook_id) = &link.webhook_id else {
                            continue;
                        };
                        if let Err(e) = adapter
                            .delete_webhook(
                                &provider.url,
                                &access_token,
                                &link.repository_path,
                                webhook_id,
                            )
                            .await
                        {
                            tracing::error!(
                                "Failed to delete webhook {} for link {}: {}",
                                webhook_id,
                                link.id,
                                e
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to refresh token while deleting provider {}: {}",
                        provider.resource_path,
                        e
                    );
                }
            }
        }

        VcsProviderRepo::delete(&self.db, &provider.id).await?;

        self.activity
            .record(&ActivityEvent::new(
                ActivityAction::DeleteVcsProvider,
                &provider.resource_path,
                &caller.display_name(),
            ))
            .await?;

        Ok(())
    }

    /// Completes the OAuth round-trip for the provider awaiting `state`.
    pub async fn process_oauth(
        &self,
        caller: &Caller,
        state: &str,
        code: &str,
    ) -> Result<VcsProvider> {
        let state = Uuid::parse_str(state).map_err(|_| {
            ElysiumError::Validation(format!("OAuth state must be a UUID, got {}", state))
        })?;

        let mut provider = VcsProviderRepo::get_by_oauth_state(&self.db, &state)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound("no VCS provider is awaiting this OAuth state".to_string())
            })?;

        self.authorizer
            .require_group_permission(
                caller,
                Permission::UpdateVcsProvider,
                provider.group_path(),
            )
            .await?;

        let adapter = self.adapters.get(provider.kind)?;
        let redirect_uri = self.config.oauth_callback_url();
        let payload = adapter
            .create_access_token(&AccessTokenInput {
                provider_url: &provider.url,
                client_id: &provider.oauth_client_id,
                client_secret: &provider.oauth_client_secret,
                grant: TokenGrant::AuthorizationCode {
                    code,
                    redirect_uri: &redirect_uri,
                },
            })
            .await?;

        adapter
            .test_connection(&provider.url, &payload.access_token)
            .await?;

        provider.oauth_state = None;
        provider.oauth_access_token = Some(payload.access_token);
        provider.oauth_refresh_token = payload.refresh_token;
        provider.oauth_token_expires_at = payload.expires_at;
        VcsProviderRepo::update(&self.db, &provider).await?;

        tracing::info!("OAuth completed for VCS provider {}", provider.resource_path);
        Ok(provider)
    }

    /// Clears the OAuth runtime and returns a fresh authorization URL.
    pub async fn reset_vcs_provider_oauth_token(
        &self,
        caller: &Caller,
        provider_id: &VcsProviderId,
    ) -> Result<VcsProviderWithAuthorizationUrl> {
        let mut provider = self.get_vcs_provider(provider_id).await?;
        self.authorizer
            .require_group_permission(
                caller,
                Permission::UpdateVcsProvider,
                provider.group_path(),
            )
            .await?;

        provider.oauth_state = Some(Uuid::new_v4());
        provider.oauth_access_token = None;
        provider.oauth_refresh_token = None;
        provider.oauth_token_expires_at = None;
        VcsProviderRepo::update(&self.db, &provider).await?;

        self.activity
            .record(&ActivityEvent::new(
                ActivityAction::ResetVcsProviderOAuthToken,
                &provider.resource_path,
                &caller.display_name(),
            ))
            .await?;

        let oauth_authorization_url = self.authorization_url(&provider)?;
        Ok(VcsProviderWithAuthorizationUrl {
            provider,
            oauth_authorization_url,
        })
    }

    /// Returns a usable access token, refreshing it when it expires within
    /// the leeway window. With `skip_update` the refreshed token is not
    /// persisted.
    pub async fn refresh_oauth_token(
        &self,
        provider: &mut VcsProvider,
        skip_update: bool,
    ) -> Result<String> {
        let Some(access_token) = provider.oauth_access_token.clone() else {
            return Err(ElysiumError::Internal(format!(
                "VCS provider {} has no access token; complete OAuth first",
                provider.resource_path
            )));
        };

        let Some(refresh_token) = provider.oauth_refresh_token.clone() else {
            // Static token hosts (GitHub) never rotate.
            return Ok(access_token);
        };

        if let Some(expires_at) = provider.oauth_token_expires_at {
            if expires_at > Utc::now() + Duration::seconds(TOKEN_EXPIRATION_LEEWAY) {
                return Ok(access_token);
            }
        } else {
            return Ok(access_token);
        }

        let adapter = self.adapters.get(provider.kind)?;
        let payload = adapter
            .create_access_token(&AccessTokenInput {
                provider_url: &provider.url,
                client_id: &provider.oauth_client_id,
                client_secret: &provider.oauth_client_secret,
                grant: TokenGrant::RefreshToken {
                    refresh_token: &refresh_token,
                },
            })
            .await?;

        provider.oauth_access_token = Some(payload.access_token.clone());
        provider.oauth_refresh_token = payload.refresh_token.or(Some(refresh_token));
        provider.oauth_token_expires_at = payload.expires_at;

        if !skip_update {
            VcsProviderRepo::update(&self.db, provider).await?;
        }

        Ok(payload.access_token)
    }

    pub(crate) fn authorization_url(&self, provider: &VcsProvider) -> Result<String> {
        let adapter = self.adapters.get(provider.kind)?;
        let state = provider.oauth_state.ok_or_else(|| {
            ElysiumError::Internal(format!(
                "VCS provider {} has no pending OAuth state",
                provider.resource_path
            ))
        })?;
        let redirect_uri = self.config.oauth_callback_url();
        Ok(adapter.build_oauth_authorization_url(&AuthorizationUrlInput {
            provider_url: &provider.url,
            client_id: &provider.oauth_client_id,
            redirect_uri: &redirect_uri,
            state: &state.to_string(),
            read_write_scope: provider.read_write_scope,
        }))
    }
}

/// Validates and normalizes a provider base URL.
fn normalize_provider_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| ElysiumError::Validation(format!("Invalid provider URL {}: {}", url, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ElysiumError::Validation(format!(
            "Provider URL must be http or https: {}",
            url
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ElysiumError::Validation(format!(
            "Provider URL has no host: {}",
            url
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}
