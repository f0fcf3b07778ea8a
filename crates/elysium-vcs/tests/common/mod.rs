//! Shared fixtures for integration tests: fake collaborators and service
//! assembly against an in-memory database.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use url::Url;
use uuid::Uuid;

use elysium_core::db::assessment::AssessmentRepo;
use elysium_core::db::namespace::{GroupRepo, WorkspaceRepo};
use elysium_core::db::provider::VcsProviderRepo;
use elysium_core::db::{create_pool, run_migrations, DbPool};
use elysium_core::models::{
    ActivityEvent, ConfigurationVersion, ConfigurationVersionId, ConfigurationVersionStatus,
    Group, Run, RunId, RunStatus, VcsProvider, VcsProviderId, VcsProviderKind, Workspace,
    WorkspaceAssessment, WorkspaceId,
};
use elysium_core::{ElysiumError, Result};
use elysium_vcs::auth::{Authorizer, Caller, Permission, WebhookTokenSigner};
use elysium_vcs::providers::AdapterRegistry;
use elysium_vcs::services::{
    ActivityLogger, ConfigurationVersionService, CreateRunInput, EmailClient, MaintenanceMonitor,
    RunService,
};
use elysium_vcs::{AsyncTaskManager, VcsConfig, VcsService};

/// Authorizer that grants everything.
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn require_group_permission(
        &self,
        _caller: &Caller,
        _permission: Permission,
        _group_path: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn require_workspace_permission(
        &self,
        _caller: &Caller,
        _permission: Permission,
        _workspace_path: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Authorizer that denies everything.
pub struct DenyAllAuthorizer;

#[async_trait]
impl Authorizer for DenyAllAuthorizer {
    async fn require_group_permission(
        &self,
        caller: &Caller,
        permission: Permission,
        group_path: &str,
    ) -> Result<()> {
        Err(ElysiumError::Forbidden(format!(
            "{} lacks {:?} on {}",
            caller.display_name(),
            permission,
            group_path
        )))
    }

    async fn require_workspace_permission(
        &self,
        caller: &Caller,
        permission: Permission,
        workspace_path: &str,
    ) -> Result<()> {
        Err(ElysiumError::Forbidden(format!(
            "{} lacks {:?} on {}",
            caller.display_name(),
            permission,
            workspace_path
        )))
    }
}

/// Run service fake: records created runs and restarts assessment rows the
/// way the platform's run service does.
#[derive(Default)]
pub struct FakeRunService {
    pub created_runs: Mutex<Vec<CreateRunInput>>,
}

impl FakeRunService {
    pub fn run_count(&self) -> usize {
        self.created_runs.lock().unwrap().len()
    }
}

#[async_trait]
impl RunService for FakeRunService {
    async fn create_run(&self, input: CreateRunInput) -> Result<Run> {
        let now = Utc::now();
        let run = Run {
            id: RunId::new(),
            workspace_id: input.workspace_id.clone(),
            configuration_version_id: Some(input.configuration_version_id.clone()),
            created_by: input.created_by.clone(),
            status: RunStatus::Pending,
            is_destroy: input.is_destroy,
            is_assessment: false,
            speculative: false,
            has_changes: false,
            plan_error_message: None,
            apply_error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.created_runs.lock().unwrap().push(input);
        Ok(run)
    }

    async fn create_assessment_run_for_workspace(
        &self,
        conn: &mut sqlx::SqliteConnection,
        workspace: &Workspace,
        current_assessment_version: Option<i64>,
    ) -> Result<Run> {
        match current_assessment_version {
            Some(version) => {
                AssessmentRepo::restart(&mut *conn, &workspace.id, version).await?;
            }
            None => {
                AssessmentRepo::create(&mut *conn, &WorkspaceAssessment::new(workspace.id.clone()))
                    .await?;
            }
        }

        let now = Utc::now();
        Ok(Run {
            id: RunId::new(),
            workspace_id: workspace.id.clone(),
            configuration_version_id: None,
            created_by: "system".to_string(),
            status: RunStatus::Pending,
            is_destroy: false,
            is_assessment: true,
            speculative: true,
            has_changes: false,
            plan_error_message: None,
            apply_error_message: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Configuration version fake: uploads flip the version to Uploaded.
#[derive(Default)]
pub struct FakeConfigurationVersionService {
    pub versions: Mutex<Vec<ConfigurationVersion>>,
    pub uploads: Mutex<Vec<(ConfigurationVersionId, usize)>>,
}

impl FakeConfigurationVersionService {
    pub fn created(&self) -> Vec<ConfigurationVersion> {
        self.versions.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfigurationVersionService for FakeConfigurationVersionService {
    async fn create_configuration_version(
        &self,
        workspace_id: &WorkspaceId,
        speculative: bool,
    ) -> Result<ConfigurationVersion> {
        let version = ConfigurationVersion {
            id: ConfigurationVersionId::new(),
            workspace_id: workspace_id.clone(),
            status: ConfigurationVersionStatus::Pending,
            speculative,
            created_at: Utc::now(),
        };
        self.versions.lock().unwrap().push(version.clone());
        Ok(version)
    }

    async fn upload_configuration(
        &self,
        id: &ConfigurationVersionId,
        data: Vec<u8>,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(ElysiumError::Internal("empty configuration upload".to_string()));
        }
        self.uploads.lock().unwrap().push((id.clone(), data.len()));
        let mut versions = self.versions.lock().unwrap();
        let version = versions
            .iter_mut()
            .find(|v| &v.id == id)
            .ok_or_else(|| ElysiumError::NotFound(format!("configuration version {}", id)))?;
        version.status = ConfigurationVersionStatus::Uploaded;
        Ok(())
    }

    async fn get_configuration_version(
        &self,
        id: &ConfigurationVersionId,
    ) -> Result<ConfigurationVersion> {
        self.versions
            .lock()
            .unwrap()
            .iter()
            .find(|v| &v.id == id)
            .cloned()
            .ok_or_else(|| ElysiumError::NotFound(format!("configuration version {}", id)))
    }
}

/// Activity logger fake that records events.
#[derive(Default)]
pub struct RecordingActivityLogger {
    pub events: Mutex<Vec<ActivityEvent>>,
}

#[async_trait]
impl ActivityLogger for RecordingActivityLogger {
    async fn record(&self, event: &ActivityEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Email client fake that records sends.
#[derive(Default)]
pub struct RecordingEmailClient {
    pub sent: Mutex<Vec<(Vec<String>, String, String)>>,
}

#[async_trait]
impl EmailClient for RecordingEmailClient {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Maintenance monitor fake.
pub struct FakeMaintenanceMonitor(pub std::sync::atomic::AtomicBool);

impl FakeMaintenanceMonitor {
    pub fn new(engaged: bool) -> Self {
        Self(std::sync::atomic::AtomicBool::new(engaged))
    }
}

#[async_trait]
impl MaintenanceMonitor for FakeMaintenanceMonitor {
    async fn in_maintenance_mode(&self) -> Result<bool> {
        Ok(self.0.load(std::sync::atomic::Ordering::SeqCst))
    }
}

/// A fully-assembled service over an in-memory database, with handles to
/// every fake.
pub struct TestHarness {
    pub db: DbPool,
    pub service: VcsService,
    pub run_service: Arc<FakeRunService>,
    pub config_versions: Arc<FakeConfigurationVersionService>,
    pub activity: Arc<RecordingActivityLogger>,
    pub tasks: AsyncTaskManager,
    pub group: Group,
    pub workspace: Workspace,
}

/// Builds the harness. `base_url` feeds webhook/callback URL derivation;
/// `repository_size_limit` bounds archive downloads.
pub async fn build_harness(repository_size_limit: u64) -> TestHarness {
    let db = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&db).await.unwrap();

    let group = Group::new_root("acme");
    GroupRepo::create(&db, &group).await.unwrap();
    let workspace = Workspace::new(&group, "networking");
    WorkspaceRepo::create(&db, &workspace).await.unwrap();

    let config = VcsConfig {
        base_url: Url::parse("https://elysium.example.com").unwrap(),
        repository_size_limit,
        providers_per_group_limit: 5,
    };

    let run_service = Arc::new(FakeRunService::default());
    let config_versions = Arc::new(FakeConfigurationVersionService::default());
    let activity = Arc::new(RecordingActivityLogger::default());
    let tasks = AsyncTaskManager::new();

    let service = VcsService::new(
        db.clone(),
        config,
        Arc::new(AdapterRegistry::new().unwrap()),
        Arc::new(AllowAllAuthorizer),
        run_service.clone(),
        config_versions.clone(),
        activity.clone(),
        Arc::new(WebhookTokenSigner::new(b"integration-test-secret")),
        tasks.clone(),
    );

    TestHarness {
        db,
        service,
        run_service,
        config_versions,
        activity,
        tasks,
        group,
        workspace,
    }
}

/// A caller for user-driven operations.
pub fn user_caller(username: &str) -> Caller {
    Caller::User {
        user_id: elysium_core::models::UserId::new(),
        username: username.to_string(),
    }
}

/// Inserts a provider with completed OAuth pointing at `provider_url`.
pub async fn insert_provider(
    db: &DbPool,
    group: &Group,
    kind: VcsProviderKind,
    provider_url: &str,
    auto_create_webhooks: bool,
) -> VcsProvider {
    let now = Utc::now();
    let provider = VcsProvider {
        id: VcsProviderId::new(),
        name: format!("{}-main", kind.as_str()),
        description: String::new(),
        group_id: group.id.clone(),
        resource_path: format!("{}/{}-main", group.full_path, kind.as_str()),
        url: provider_url.trim_end_matches('/').to_string(),
        kind,
        oauth_client_id: "client".to_string(),
        oauth_client_secret: "secret".to_string(),
        oauth_state: None,
        oauth_access_token: Some("token".to_string()),
        oauth_refresh_token: None,
        oauth_token_expires_at: None,
        auto_create_webhooks,
        read_write_scope: false,
        created_at: now,
        updated_at: now,
    };
    VcsProviderRepo::create(db, &provider).await.unwrap();
    provider
}

/// A random UUID string, for OAuth states in tests.
pub fn fresh_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Builds an in-memory tar.gz shaped like a host archive: one top-level
/// `{owner}-{repo}-{sha}` directory containing the given files.
pub fn build_archive(top_level: &str, files: &[(&str, &str)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let path = format!("{}/{}", top_level, name);
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
