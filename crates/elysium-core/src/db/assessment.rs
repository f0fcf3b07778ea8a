//! Database operations for workspace drift assessments.
//!
//! Methods take any sqlite executor so the scheduler can run them inside
//! the transaction that gates the in-progress cap.

use chrono::Utc;
use sqlx::Row;

use super::{decode_err, parse_timestamp, parse_timestamp_opt};
use crate::error::Result;
use crate::models::{AssessmentId, WorkspaceAssessment, WorkspaceId};

const ASSESSMENT_COLUMNS: &str =
    "id, workspace_id, has_drift, requires_notification, started_at, completed_at, version";

/// Workspace assessment database operations.
pub struct AssessmentRepo;

impl AssessmentRepo {
    /// Creates a new assessment row.
    pub async fn create(
        ex: impl sqlx::SqliteExecutor<'_>,
        assessment: &WorkspaceAssessment,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workspace_assessments (
                id, workspace_id, has_drift, requires_notification,
                started_at, completed_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(assessment.id.to_string())
        .bind(assessment.workspace_id.to_string())
        .bind(assessment.has_drift)
        .bind(assessment.requires_notification)
        .bind(assessment.started_at.to_rfc3339())
        .bind(assessment.completed_at.map(|t| t.to_rfc3339()))
        .bind(assessment.version)
        .execute(ex)
        .await?;

        Ok(())
    }

    /// Gets the assessment for a workspace, if one exists.
    pub async fn get_by_workspace(
        ex: impl sqlx::SqliteExecutor<'_>,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<WorkspaceAssessment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workspace_assessments WHERE workspace_id = ?",
            ASSESSMENT_COLUMNS
        ))
        .bind(workspace_id.to_string())
        .fetch_optional(ex)
        .await?;

        row.map(|r| Self::row_to_assessment(&r)).transpose()
    }

    /// Restarts a workspace's assessment: clears completion, bumps the
    /// version, and stamps a fresh `started_at`.
    pub async fn restart(
        ex: impl sqlx::SqliteExecutor<'_>,
        workspace_id: &WorkspaceId,
        expected_version: i64,
    ) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE workspace_assessments
            SET started_at = ?, completed_at = NULL, version = version + 1
            WHERE workspace_id = ? AND version = ?
            "#,
        )
        .bind(&now)
        .bind(workspace_id.to_string())
        .bind(expected_version)
        .execute(ex)
        .await?;

        Ok(result.rows_affected())
    }

    /// Marks a workspace's assessment completed.
    pub async fn complete(
        ex: impl sqlx::SqliteExecutor<'_>,
        workspace_id: &WorkspaceId,
        has_drift: bool,
        requires_notification: bool,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE workspace_assessments
            SET has_drift = ?, requires_notification = ?, completed_at = ?
            WHERE workspace_id = ?
            "#,
        )
        .bind(has_drift)
        .bind(requires_notification)
        .bind(&now)
        .bind(workspace_id.to_string())
        .execute(ex)
        .await?;

        Ok(())
    }

    /// Counts assessments whose run has not completed yet.
    pub async fn count_in_progress(ex: impl sqlx::SqliteExecutor<'_>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM workspace_assessments WHERE completed_at IS NULL",
        )
        .fetch_one(ex)
        .await?;

        Ok(row.get("n"))
    }

    /// Deletes a workspace's assessment. Used when a non-assessment applied
    /// run supersedes the state version it was computed against.
    pub async fn delete_by_workspace(
        ex: impl sqlx::SqliteExecutor<'_>,
        workspace_id: &WorkspaceId,
    ) -> Result<()> {
        sqlx::query("DELETE FROM workspace_assessments WHERE workspace_id = ?")
            .bind(workspace_id.to_string())
            .execute(ex)
            .await?;

        Ok(())
    }

    fn row_to_assessment(row: &sqlx::sqlite::SqliteRow) -> Result<WorkspaceAssessment> {
        let id_str: String = row.get("id");
        let workspace_id_str: String = row.get("workspace_id");
        let started_at_str: String = row.get("started_at");
        let completed_at_str: Option<String> = row.get("completed_at");

        Ok(WorkspaceAssessment {
            id: AssessmentId::from_string(&id_str).map_err(decode_err)?,
            workspace_id: WorkspaceId::from_string(&workspace_id_str).map_err(decode_err)?,
            has_drift: row.get("has_drift"),
            requires_notification: row.get("requires_notification"),
            started_at: parse_timestamp("assessment.started_at", &started_at_str)?,
            completed_at: parse_timestamp_opt("assessment.completed_at", completed_at_str)?,
            version: row.get("version"),
        })
    }
}
