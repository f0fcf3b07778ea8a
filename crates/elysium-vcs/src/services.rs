//! Collaborator interfaces supplied by the embedding platform.

use async_trait::async_trait;

use elysium_core::models::{
    ActivityEvent, ConfigurationVersion, ConfigurationVersionId, Run, Workspace, WorkspaceId,
};
use elysium_core::Result;

/// Input for creating a run from a configuration version.
#[derive(Debug, Clone)]
pub struct CreateRunInput {
    pub workspace_id: WorkspaceId,
    pub configuration_version_id: ConfigurationVersionId,
    pub is_destroy: bool,
    /// Identity recorded as the run's creator.
    pub created_by: String,
}

/// The run service collaborator.
#[async_trait]
pub trait RunService: Send + Sync {
    /// Creates a run for an uploaded configuration version.
    async fn create_run(&self, input: CreateRunInput) -> Result<Run>;

    /// Creates a drift-assessment run for a workspace, restarting its
    /// assessment record inside the caller's open transaction.
    /// `current_assessment_version` carries the optimistic-concurrency
    /// counter observed before scheduling.
    async fn create_assessment_run_for_workspace(
        &self,
        conn: &mut sqlx::SqliteConnection,
        workspace: &Workspace,
        current_assessment_version: Option<i64>,
    ) -> Result<Run>;
}

/// The workspace service's configuration version surface.
#[async_trait]
pub trait ConfigurationVersionService: Send + Sync {
    /// Creates a new configuration version in Pending state.
    async fn create_configuration_version(
        &self,
        workspace_id: &WorkspaceId,
        speculative: bool,
    ) -> Result<ConfigurationVersion>;

    /// Uploads the tarred module directory for a configuration version.
    async fn upload_configuration(
        &self,
        id: &ConfigurationVersionId,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Re-reads a configuration version's current state.
    async fn get_configuration_version(
        &self,
        id: &ConfigurationVersionId,
    ) -> Result<ConfigurationVersion>;
}

/// Activity log collaborator.
#[async_trait]
pub trait ActivityLogger: Send + Sync {
    async fn record(&self, event: &ActivityEvent) -> Result<()>;
}

/// Email delivery collaborator.
#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()>;
}

/// Maintenance mode collaborator; the scheduler idles while engaged.
#[async_trait]
pub trait MaintenanceMonitor: Send + Sync {
    async fn in_maintenance_mode(&self) -> Result<bool>;
}
