//! Periodic drift-assessment scheduler.
//!
//! One task per process; safe across replicas because eligibility is gated
//! by per-workspace assessment timestamps and the in-progress cap is
//! re-checked inside the scheduling transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::watch;

use elysium_core::db::assessment::AssessmentRepo;
use elysium_core::db::namespace::WorkspaceRepo;
use elysium_core::db::DbPool;
use elysium_core::models::Workspace;
use elysium_core::Result;

use crate::config::SchedulerConfig;
use crate::services::{MaintenanceMonitor, RunService};
use crate::settings::InheritedSettingResolver;

/// Handle for managing the scheduler task.
pub struct SchedulerHandle {
    task_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Signals the scheduler to shut down and waits for it to finish.
    pub async fn shutdown(self) -> std::result::Result<(), tokio::task::JoinError> {
        let _ = self.shutdown_tx.send(true);
        self.task_handle.await
    }
}

/// Background loop that starts drift-assessment runs for eligible
/// workspaces.
pub struct AssessmentScheduler {
    db: DbPool,
    run_service: Arc<dyn RunService>,
    maintenance: Arc<dyn MaintenanceMonitor>,
    resolver: InheritedSettingResolver,
    config: SchedulerConfig,
}

impl AssessmentScheduler {
    pub fn new(
        db: DbPool,
        run_service: Arc<dyn RunService>,
        maintenance: Arc<dyn MaintenanceMonitor>,
        config: SchedulerConfig,
    ) -> Self {
        let resolver = InheritedSettingResolver::new(db.clone());
        Self {
            db,
            run_service,
            maintenance,
            resolver,
            config,
        }
    }

    /// Spawns the scheduler loop.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task_handle = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        SchedulerHandle {
            task_handle,
            shutdown_tx,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!("Assessment scheduler started");
        let mut cursor: Option<String> = None;

        loop {
            let sleep = self.sleep_duration();
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }

            match self.run_iteration(cursor.clone()).await {
                Ok(next_cursor) => cursor = next_cursor,
                Err(e) => {
                    tracing::error!("Assessment scheduler iteration failed: {}", e);
                }
            }
        }

        tracing::info!("Assessment scheduler stopped");
    }

    /// Uniform random sleep desynchronizes replicas.
    fn sleep_duration(&self) -> Duration {
        let min = self.config.min_sleep_secs.min(self.config.max_sleep_secs);
        let max = self.config.max_sleep_secs.max(self.config.min_sleep_secs);
        let secs = rand::thread_rng().gen_range(min..=max);
        Duration::from_secs(secs)
    }

    /// One scheduling pass. Returns the cursor for the next iteration:
    /// unchanged when maintenance mode is engaged or the run limit forced a
    /// yield, advanced past the processed page otherwise, and cleared when
    /// pagination is exhausted.
    pub async fn run_iteration(&self, cursor: Option<String>) -> Result<Option<String>> {
        if self.maintenance.in_maintenance_mode().await? {
            tracing::debug!("Maintenance mode engaged; skipping assessment pass");
            return Ok(cursor);
        }

        let assessed_before = Utc::now() - self.config.assessment_min_interval;
        let page = WorkspaceRepo::list_assessment_candidates(
            &self.db,
            cursor.as_deref(),
            self.config.page_size,
            assessed_before,
        )
        .await?;

        // Group lookups repeat heavily within a page; cache per batch only
        // so inheritance changes are picked up on the next pass.
        let mut group_cache: HashMap<String, bool> = HashMap::new();

        for workspace in &page.workspaces {
            let enabled = match workspace.drift_detection_enabled {
                Some(value) => value,
                None => {
                    let group_path = workspace.group_path().to_string();
                    match group_cache.get(&group_path) {
                        Some(value) => *value,
                        None => {
                            let value = self
                                .resolver
                                .group_drift_detection(&group_path)
                                .await?
                                .unwrap_or(false);
                            group_cache.insert(group_path, value);
                            value
                        }
                    }
                }
            };
            if !enabled {
                continue;
            }

            // Re-read: another replica may have started an assessment since
            // the page was fetched.
            let assessment = AssessmentRepo::get_by_workspace(&self.db, &workspace.id).await?;
            if let Some(a) = &assessment {
                if a.started_at > assessed_before {
                    continue;
                }
            }

            let started = self
                .try_start_assessment(workspace, assessment.as_ref().map(|a| a.version))
                .await?;
            if !started {
                tracing::info!(
                    "Assessment run limit {} reached; yielding until the next pass",
                    self.config.assessment_run_limit
                );
                return Ok(cursor);
            }
        }

        Ok(page.next_cursor)
    }

    /// Starts one assessment inside a transaction. The in-progress count is
    /// re-queried after scheduling; exceeding the limit rolls back, which
    /// yields to whichever replica got there first.
    async fn try_start_assessment(
        &self,
        workspace: &Workspace,
        current_assessment_version: Option<i64>,
    ) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        self.run_service
            .create_assessment_run_for_workspace(&mut *tx, workspace, current_assessment_version)
            .await?;

        let in_progress = AssessmentRepo::count_in_progress(&mut *tx).await?;
        if in_progress <= self.config.assessment_run_limit {
            tx.commit().await?;
            tracing::debug!("Started drift assessment for workspace {}", workspace.full_path);
            Ok(true)
        } else {
            tx.rollback().await?;
            Ok(false)
        }
    }
}
