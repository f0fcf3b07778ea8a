//! Assessment scheduler integration tests.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::{FakeMaintenanceMonitor, FakeRunService};
use elysium_core::db::assessment::AssessmentRepo;
use elysium_core::db::namespace::{GroupRepo, WorkspaceRepo};
use elysium_core::db::{create_pool, run_migrations, DbPool};
use elysium_core::models::{Group, Workspace, WorkspaceAssessment};
use elysium_vcs::scheduler::AssessmentScheduler;
use elysium_vcs::SchedulerConfig;

struct SchedulerFixture {
    db: DbPool,
    group: Group,
    run_service: Arc<FakeRunService>,
    maintenance: Arc<FakeMaintenanceMonitor>,
}

impl SchedulerFixture {
    async fn new(drift_enabled_on_group: bool) -> Self {
        let db = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();

        let mut group = Group::new_root("acme");
        if drift_enabled_on_group {
            group.drift_detection_enabled = Some(true);
        }
        GroupRepo::create(&db, &group).await.unwrap();

        Self {
            db,
            group,
            run_service: Arc::new(FakeRunService::default()),
            maintenance: Arc::new(FakeMaintenanceMonitor::new(false)),
        }
    }

    fn scheduler(&self, config: SchedulerConfig) -> AssessmentScheduler {
        AssessmentScheduler::new(
            self.db.clone(),
            self.run_service.clone(),
            self.maintenance.clone(),
            config,
        )
    }

    /// Inserts a workspace with a current state version, eligible for
    /// assessment.
    async fn eligible_workspace(&self, name: &str) -> Workspace {
        let mut ws = Workspace::new(&self.group, name);
        ws.current_state_version_id = Some("sv-1".to_string());
        WorkspaceRepo::create(&self.db, &ws).await.unwrap();
        ws
    }

    /// Inserts a workspace already holding an in-progress assessment. It is
    /// excluded from candidate pages by its fresh `started_at`.
    async fn in_progress_workspace(&self, name: &str) -> Workspace {
        let ws = self.eligible_workspace(name).await;
        AssessmentRepo::create(&self.db, &WorkspaceAssessment::new(ws.id.clone()))
            .await
            .unwrap();
        ws
    }
}

fn test_config(limit: i64) -> SchedulerConfig {
    SchedulerConfig {
        min_sleep_secs: 1,
        max_sleep_secs: 1,
        assessment_min_interval: Duration::hours(24),
        assessment_run_limit: limit,
        page_size: 100,
    }
}

#[tokio::test]
async fn starts_assessments_for_eligible_workspaces() {
    let fixture = SchedulerFixture::new(true).await;
    for name in ["a", "b", "c"] {
        fixture.eligible_workspace(name).await;
    }

    let scheduler = fixture.scheduler(test_config(10));
    let cursor = scheduler.run_iteration(None).await.unwrap();

    // Page was not full: pagination restarts next pass.
    assert!(cursor.is_none());
    assert_eq!(AssessmentRepo::count_in_progress(&fixture.db).await.unwrap(), 3);
}

#[tokio::test]
async fn run_limit_caps_concurrent_assessments() {
    let fixture = SchedulerFixture::new(true).await;

    // Nine assessments already in flight elsewhere.
    for i in 0..9 {
        fixture.in_progress_workspace(&format!("busy-{}", i)).await;
    }
    // Twelve more workspaces want one.
    for i in 0..12 {
        fixture.eligible_workspace(&format!("ws-{:02}", i)).await;
    }

    let scheduler = fixture.scheduler(test_config(10));
    let cursor = scheduler.run_iteration(None).await.unwrap();

    // Exactly one more fits under the cap; the batch stops with the cursor
    // unchanged.
    assert!(cursor.is_none());
    assert_eq!(
        AssessmentRepo::count_in_progress(&fixture.db).await.unwrap(),
        10
    );
}

#[tokio::test]
async fn maintenance_mode_skips_the_pass() {
    let fixture = SchedulerFixture::new(true).await;
    fixture.eligible_workspace("a").await;
    fixture
        .maintenance
        .0
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let scheduler = fixture.scheduler(test_config(10));
    let cursor = scheduler
        .run_iteration(Some("acme/cursor".to_string()))
        .await
        .unwrap();

    // Cursor is preserved and nothing starts.
    assert_eq!(cursor.as_deref(), Some("acme/cursor"));
    assert_eq!(AssessmentRepo::count_in_progress(&fixture.db).await.unwrap(), 0);
}

#[tokio::test]
async fn drift_detection_defaults_to_disabled() {
    let fixture = SchedulerFixture::new(false).await;
    fixture.eligible_workspace("a").await;

    let scheduler = fixture.scheduler(test_config(10));
    scheduler.run_iteration(None).await.unwrap();

    assert_eq!(AssessmentRepo::count_in_progress(&fixture.db).await.unwrap(), 0);
}

#[tokio::test]
async fn workspace_setting_overrides_group_inheritance() {
    let fixture = SchedulerFixture::new(true).await;

    // Group enables drift detection, this workspace opts out.
    let mut opted_out = Workspace::new(&fixture.group, "opted-out");
    opted_out.current_state_version_id = Some("sv-1".to_string());
    opted_out.drift_detection_enabled = Some(false);
    WorkspaceRepo::create(&fixture.db, &opted_out).await.unwrap();

    fixture.eligible_workspace("tracked").await;

    let scheduler = fixture.scheduler(test_config(10));
    scheduler.run_iteration(None).await.unwrap();

    assert_eq!(AssessmentRepo::count_in_progress(&fixture.db).await.unwrap(), 1);
    assert!(AssessmentRepo::get_by_workspace(&fixture.db, &opted_out.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn completed_assessment_older_than_interval_is_restarted() {
    let fixture = SchedulerFixture::new(true).await;
    let ws = fixture.eligible_workspace("a").await;

    // A completed assessment from two days ago.
    let mut assessment = WorkspaceAssessment::new(ws.id.clone());
    assessment.started_at = Utc::now() - Duration::days(2);
    assessment.completed_at = Some(Utc::now() - Duration::days(2));
    AssessmentRepo::create(&fixture.db, &assessment).await.unwrap();

    let scheduler = fixture.scheduler(test_config(10));
    scheduler.run_iteration(None).await.unwrap();

    let restarted = AssessmentRepo::get_by_workspace(&fixture.db, &ws.id)
        .await
        .unwrap()
        .unwrap();
    assert!(restarted.in_progress());
    assert_eq!(restarted.version, 2);
}

#[tokio::test]
async fn scheduler_handle_shuts_down_cleanly() {
    let fixture = SchedulerFixture::new(true).await;
    let handle = fixture.scheduler(test_config(10)).start();
    handle.shutdown().await.unwrap();
}
