//! Run state-change worker: failed-run email and assessment bookkeeping.

use std::sync::Arc;

use regex_lite::Regex;
use tokio::sync::mpsc;

use elysium_core::db::assessment::AssessmentRepo;
use elysium_core::db::namespace::WorkspaceRepo;
use elysium_core::db::user::UserRepo;
use elysium_core::db::DbPool;
use elysium_core::models::{NotificationEvent, Run, RunStatus, UserId};
use elysium_core::{ElysiumError, Result};

use super::NotificationManager;
use crate::services::EmailClient;
use crate::tasks::AsyncTaskManager;

/// Unicode box-drawing characters the plan/apply renderers emit.
const BOX_DRAWING_CHARS: &[char] = &['─', '│', '╷', '╵', '┌', '┐', '└', '┘', '╭', '╮', '╯', '╰'];

/// Which stage produced the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailedStage {
    Plan,
    Apply,
}

/// Consumes run state-change messages.
pub struct RunEventWorker {
    db: DbPool,
    email: Arc<dyn EmailClient>,
    notifications: NotificationManager,
    tasks: AsyncTaskManager,
}

/// Starts the run event worker.
///
/// Returns a sender for submitting run state changes and a handle to the
/// worker task. The worker stops when every sender is dropped.
pub fn start_run_event_worker(
    db: DbPool,
    email: Arc<dyn EmailClient>,
    notifications: NotificationManager,
    tasks: AsyncTaskManager,
) -> (mpsc::Sender<Run>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Run>(1000);

    let worker = RunEventWorker {
        db,
        email,
        notifications,
        tasks,
    };

    let handle = tokio::spawn(async move {
        tracing::info!("Run event worker started");
        while let Some(run) = rx.recv().await {
            if let Err(e) = worker.handle_run_event(&run).await {
                tracing::error!("Failed to handle run event for {}: {}", run.id, e);
            }
        }
        tracing::info!("Run event worker stopped");
    });

    (tx, handle)
}

impl RunEventWorker {
    /// Processes one run state change.
    pub async fn handle_run_event(&self, run: &Run) -> Result<()> {
        if run.is_assessment {
            match run.status {
                RunStatus::PlannedAndFinished => {
                    AssessmentRepo::complete(
                        &self.db,
                        &run.workspace_id,
                        run.has_changes,
                        run.has_changes,
                    )
                    .await?;
                }
                RunStatus::Errored | RunStatus::Canceled => {
                    // Free the in-progress slot even though no verdict was
                    // reached.
                    AssessmentRepo::complete(&self.db, &run.workspace_id, false, false).await?;
                }
                _ => {}
            }
        } else if run.status == RunStatus::Applied {
            // The applied run supersedes the state version the assessment
            // was computed against.
            AssessmentRepo::delete_by_workspace(&self.db, &run.workspace_id).await?;
        }

        if run.status == RunStatus::Errored {
            self.send_failed_run_email(run).await?;
        }

        Ok(())
    }

    async fn send_failed_run_email(&self, run: &Run) -> Result<()> {
        let participants = self.resolve_participants(run).await?;

        let workspace = WorkspaceRepo::get_by_id(&self.db, &run.workspace_id)
            .await?
            .ok_or_else(|| {
                ElysiumError::NotFound(format!("workspace {} not found", run.workspace_id))
            })?;

        let recipients = self
            .notifications
            .users_to_notify(&workspace.full_path, &participants, NotificationEvent::FailedRun)
            .await?;
        if recipients.is_empty() {
            return Ok(());
        }

        let (stage, raw_message) = match (&run.apply_error_message, &run.plan_error_message) {
            (Some(message), _) => (FailedStage::Apply, message.as_str()),
            (None, Some(message)) => (FailedStage::Plan, message.as_str()),
            (None, None) => (FailedStage::Plan, ""),
        };

        let headline = failure_headline(stage, run);
        let subject = format!("{}: {}", workspace.full_path, headline);
        let body = format!(
            "Run {} in workspace {} failed.\n\n{}\n",
            run.id,
            workspace.full_path,
            clean_error_message(raw_message)
        );

        let addresses: Vec<String> = recipients.into_iter().map(|u| u.email).collect();
        let email = self.email.clone();
        let run_id = run.id.clone();
        self.tasks.spawn(async move {
            if let Err(e) = email.send(&addresses, &subject, &body).await {
                tracing::error!("Failed to send failed-run email for {}: {}", run_id, e);
            }
        });

        Ok(())
    }

    /// An email-shaped creator resolves to a participant; service
    /// identities contribute none.
    async fn resolve_participants(&self, run: &Run) -> Result<Vec<UserId>> {
        if !run.created_by.contains('@') {
            return Ok(Vec::new());
        }
        Ok(UserRepo::get_by_email(&self.db, &run.created_by)
            .await?
            .map(|user| vec![user.id])
            .unwrap_or_default())
    }
}

fn failure_headline(stage: FailedStage, run: &Run) -> &'static str {
    match stage {
        FailedStage::Apply => {
            if run.is_destroy {
                "destroy failed"
            } else {
                "apply failed"
            }
        }
        FailedStage::Plan => {
            if run.speculative {
                "speculative plan failed"
            } else if run.is_destroy {
                "destroy plan failed"
            } else {
                "plan failed"
            }
        }
    }
}

/// Strips ANSI color escapes and box-drawing characters from renderer
/// output.
pub fn clean_error_message(message: &str) -> String {
    let ansi = Regex::new(r"\x1b\[[0-9;]*m").expect("ANSI escape regex is valid");
    let without_ansi = ansi.replace_all(message, "");
    without_ansi
        .chars()
        .filter(|c| !BOX_DRAWING_CHARS.contains(c))
        .collect()
}
