//! Async event handler: turns a persisted VCS event into a run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use elysium_core::db::event::VcsEventRepo;
use elysium_core::db::DbPool;
use elysium_core::models::{
    ConfigurationVersionStatus, Run, VcsEventId, VcsEventStatus, VcsEventType, VcsProviderKind,
    WorkspaceId, WorkspaceVcsProviderLink,
};
use elysium_core::{ElysiumError, Result};

use super::archive::{fetch_repository, pack_module};
use super::globs::globs_match;
use crate::config::VcsConfig;
use crate::providers::AdapterRegistry;
use crate::services::{ConfigurationVersionService, CreateRunInput, RunService};
use crate::tasks::AsyncTaskManager;

/// Interval between configuration upload status polls.
const UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Everything the async handler needs, captured synchronously before
/// dispatch. The provider token is refreshed by the service beforehand.
#[derive(Debug, Clone)]
pub struct EventExecution {
    pub event_id: VcsEventId,
    pub workspace_id: WorkspaceId,
    pub link: WorkspaceVcsProviderLink,
    pub provider_kind: VcsProviderKind,
    pub provider_url: String,
    pub access_token: String,
    pub event_type: VcsEventType,
    /// Ref the archive is fetched at: tracked branch, tag name, merge
    /// request source branch, or a manual ref.
    pub fetch_ref: String,
    /// Base commit for a two-ref diff; absent or zero falls back to a
    /// single-ref diff.
    pub diff_before: Option<String>,
    /// Head commit for diffs.
    pub diff_after: Option<String>,
    pub is_destroy: bool,
    pub created_by: String,
}

/// Shared pipeline for webhook and manual triggers.
pub struct EventExecutor {
    db: DbPool,
    adapters: Arc<AdapterRegistry>,
    config_versions: Arc<dyn ConfigurationVersionService>,
    run_service: Arc<dyn RunService>,
    config: VcsConfig,
}

impl EventExecutor {
    pub fn new(
        db: DbPool,
        adapters: Arc<AdapterRegistry>,
        config_versions: Arc<dyn ConfigurationVersionService>,
        run_service: Arc<dyn RunService>,
        config: VcsConfig,
    ) -> Self {
        Self {
            db,
            adapters,
            config_versions,
            run_service,
            config,
        }
    }

    /// Schedules the handler on the task manager. The event record is
    /// finalized from inside the task; errors never propagate to the
    /// caller.
    pub fn dispatch(self: &Arc<Self>, tasks: &AsyncTaskManager, execution: EventExecution) {
        let executor = self.clone();
        tasks.spawn(async move {
            let event_id = execution.event_id.clone();
            match executor.process(execution).await {
                Ok(_) => {
                    if let Err(e) = VcsEventRepo::update_status(
                        &executor.db,
                        &event_id,
                        VcsEventStatus::Finished,
                        None,
                    )
                    .await
                    {
                        tracing::error!("Failed to finalize VCS event {}: {}", event_id, e);
                    }
                }
                Err(e) => {
                    if e.is_forbidden() {
                        tracing::info!("VCS event {} denied: {}", event_id, e);
                    } else {
                        tracing::error!("VCS event {} failed: {}", event_id, e);
                    }
                    let message = e.to_string();
                    if let Err(e2) = VcsEventRepo::update_status(
                        &executor.db,
                        &event_id,
                        VcsEventStatus::Errored,
                        Some(message.as_str()),
                    )
                    .await
                    {
                        tracing::error!("Failed to finalize VCS event {}: {}", event_id, e2);
                    }
                }
            }
        });
    }

    /// Runs the pipeline. Returns the created run, or `None` when the glob
    /// filter decided no run was needed.
    pub async fn process(&self, execution: EventExecution) -> Result<Option<Run>> {
        let adapter = self.adapters.get(execution.provider_kind)?;

        // Diff phase. Failures are logged and the pipeline proceeds
        // unfiltered.
        let altered_files = if execution.event_type != VcsEventType::Tag
            && !execution.link.glob_patterns.is_empty()
        {
            let result = match (&execution.diff_before, &execution.diff_after) {
                (Some(before), Some(after)) => {
                    adapter
                        .get_diffs(
                            &execution.provider_url,
                            &execution.access_token,
                            &execution.link.repository_path,
                            before,
                            after,
                        )
                        .await
                        .map(Some)
                }
                (None, Some(after)) => {
                    adapter
                        .get_diff(
                            &execution.provider_url,
                            &execution.access_token,
                            &execution.link.repository_path,
                            after,
                        )
                        .await
                        .map(Some)
                }
                _ => Ok(None),
            };
            match result {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!(
                        "Failed to fetch diff for event {}: {}",
                        execution.event_id,
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        // Archive phase.
        let response = adapter
            .get_archive(
                &execution.provider_url,
                &execution.access_token,
                &execution.link.repository_path,
                &execution.fetch_ref,
            )
            .await?;
        let repository = fetch_repository(response, self.config.repository_size_limit).await?;

        // Glob filter.
        if let Some(files) = &altered_files {
            if !self.passes_glob_filter(&execution, repository.path(), files) {
                tracing::info!(
                    "Skipping run for event {}: no altered file matches the link globs",
                    execution.event_id
                );
                return Ok(None);
            }
        }

        // Configuration version phase.
        let speculative = execution.event_type == VcsEventType::MergeRequest;
        let configuration_version = self
            .config_versions
            .create_configuration_version(&execution.workspace_id, speculative)
            .await?;

        let module_dir = repository.module_path(execution.link.module_directory.as_deref())?;
        let data = pack_module(&module_dir).await?;
        self.config_versions
            .upload_configuration(&configuration_version.id, data)
            .await?;

        self.wait_for_upload(&configuration_version.id).await?;

        // Run phase.
        let run = self
            .run_service
            .create_run(CreateRunInput {
                workspace_id: execution.workspace_id.clone(),
                configuration_version_id: configuration_version.id.clone(),
                is_destroy: execution.is_destroy,
                created_by: execution.created_by.clone(),
            })
            .await?;

        tracing::info!(
            "Created run {} for workspace {} from event {}",
            run.id,
            execution.workspace_id,
            execution.event_id
        );

        Ok(Some(run))
    }

    fn passes_glob_filter(
        &self,
        execution: &EventExecution,
        repo_dir: &std::path::Path,
        altered_files: &HashSet<String>,
    ) -> bool {
        if altered_files.is_empty() || execution.link.glob_patterns.is_empty() {
            return true;
        }
        globs_match(repo_dir, altered_files, &execution.link.glob_patterns)
    }

    /// Polls until the configuration version leaves Pending.
    async fn wait_for_upload(
        &self,
        id: &elysium_core::models::ConfigurationVersionId,
    ) -> Result<()> {
        loop {
            let current = self.config_versions.get_configuration_version(id).await?;
            match current.status {
                ConfigurationVersionStatus::Uploaded => return Ok(()),
                ConfigurationVersionStatus::Errored => {
                    return Err(ElysiumError::Internal(format!(
                        "configuration version {} errored during upload",
                        id
                    )));
                }
                ConfigurationVersionStatus::Pending => {
                    tokio::time::sleep(UPLOAD_POLL_INTERVAL).await;
                }
            }
        }
    }
}
