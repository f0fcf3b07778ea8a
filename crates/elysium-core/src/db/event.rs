//! Database operations for VCS events.

use chrono::Utc;
use sqlx::Row;

use super::{decode_err, parse_timestamp, DbPool};
use crate::error::Result;
use crate::models::{VcsEvent, VcsEventId, VcsEventStatus, WorkspaceId};

const EVENT_COLUMNS: &str = r#"id, workspace_id, event_type, status, source_ref, commit_id,
       repository_url, error_message, created_at, updated_at"#;

/// VCS event database operations.
pub struct VcsEventRepo;

impl VcsEventRepo {
    /// Creates a new VCS event.
    pub async fn create(pool: &DbPool, event: &VcsEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vcs_events (
                id, workspace_id, event_type, status, source_ref, commit_id,
                repository_url, error_message, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.workspace_id.to_string())
        .bind(event.event_type.as_str())
        .bind(event.status.as_str())
        .bind(&event.source_ref)
        .bind(&event.commit_id)
        .bind(&event.repository_url)
        .bind(&event.error_message)
        .bind(event.created_at.to_rfc3339())
        .bind(event.updated_at.to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Gets an event by ID.
    pub async fn get_by_id(pool: &DbPool, id: &VcsEventId) -> Result<Option<VcsEvent>> {
        let row = sqlx::query(&format!("SELECT {} FROM vcs_events WHERE id = ?", EVENT_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;

        row.map(|r| Self::row_to_event(&r)).transpose()
    }

    /// Lists events for a workspace, newest first.
    pub async fn list_for_workspace(
        pool: &DbPool,
        workspace_id: &WorkspaceId,
    ) -> Result<Vec<VcsEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM vcs_events WHERE workspace_id = ? ORDER BY created_at DESC LIMIT 100",
            EVENT_COLUMNS
        ))
        .bind(workspace_id.to_string())
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    /// Finalizes an event's lifecycle status.
    pub async fn update_status(
        pool: &DbPool,
        id: &VcsEventId,
        status: VcsEventStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE vcs_events SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(&now)
        .bind(id.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<VcsEvent> {
        let id_str: String = row.get("id");
        let workspace_id_str: String = row.get("workspace_id");
        let type_str: String = row.get("event_type");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(VcsEvent {
            id: VcsEventId::from_string(&id_str).map_err(decode_err)?,
            workspace_id: WorkspaceId::from_string(&workspace_id_str).map_err(decode_err)?,
            event_type: type_str.parse()?,
            status: status_str.parse()?,
            source_ref: row.get("source_ref"),
            commit_id: row.get("commit_id"),
            repository_url: row.get("repository_url"),
            error_message: row.get("error_message"),
            created_at: parse_timestamp("vcs_event.created_at", &created_at_str)?,
            updated_at: parse_timestamp("vcs_event.updated_at", &updated_at_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::namespace::{GroupRepo, WorkspaceRepo};
    use crate::db::{create_pool, run_migrations};
    use crate::models::{Group, VcsEventType, Workspace};

    async fn setup() -> (DbPool, Workspace) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let group = Group::new_root("acme");
        GroupRepo::create(&pool, &group).await.unwrap();
        let workspace = Workspace::new(&group, "networking");
        WorkspaceRepo::create(&pool, &workspace).await.unwrap();
        (pool, workspace)
    }

    #[tokio::test]
    async fn test_status_advances_to_finished() {
        let (pool, workspace) = setup().await;
        let event = VcsEvent::new(
            workspace.id.clone(),
            VcsEventType::Branch,
            Some("main".to_string()),
            Some("deadbeef".to_string()),
            "https://gitlab.com/owner/repo".to_string(),
        );
        VcsEventRepo::create(&pool, &event).await.unwrap();

        VcsEventRepo::update_status(&pool, &event.id, VcsEventStatus::Finished, None)
            .await
            .unwrap();

        let fetched = VcsEventRepo::get_by_id(&pool, &event.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, VcsEventStatus::Finished);
        assert!(fetched.error_message.is_none());
    }

    #[tokio::test]
    async fn test_errored_event_keeps_message() {
        let (pool, workspace) = setup().await;
        let event = VcsEvent::new(
            workspace.id.clone(),
            VcsEventType::Manual,
            None,
            None,
            "https://gitlab.com/owner/repo".to_string(),
        );
        VcsEventRepo::create(&pool, &event).await.unwrap();

        VcsEventRepo::update_status(
            &pool,
            &event.id,
            VcsEventStatus::Errored,
            Some("download size 2048 exceeds limit 1024"),
        )
        .await
        .unwrap();

        let fetched = VcsEventRepo::get_by_id(&pool, &event.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, VcsEventStatus::Errored);
        assert_eq!(
            fetched.error_message.as_deref(),
            Some("download size 2048 exceeds limit 1024")
        );
    }
}
