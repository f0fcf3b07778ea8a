//! Database operations for groups and workspaces.

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{decode_err, parse_timestamp, DbPool};
use crate::error::Result;
use crate::models::{Group, GroupId, Workspace, WorkspaceId};

const GROUP_COLUMNS: &str =
    "id, name, full_path, parent_id, drift_detection_enabled, created_at, updated_at";

const WORKSPACE_COLUMNS: &str = r#"id, name, full_path, group_id, locked, current_state_version_id,
       drift_detection_enabled, created_at, updated_at"#;

/// Group database operations.
pub struct GroupRepo;

impl GroupRepo {
    /// Creates a new group.
    pub async fn create(pool: &DbPool, group: &Group) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO groups (
                id, name, full_path, parent_id, drift_detection_enabled,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(&group.full_path)
        .bind(group.parent_id.as_ref().map(|id| id.to_string()))
        .bind(group.drift_detection_enabled)
        .bind(group.created_at.to_rfc3339())
        .bind(group.updated_at.to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Gets a group by ID.
    pub async fn get_by_id(pool: &DbPool, id: &GroupId) -> Result<Option<Group>> {
        let row = sqlx::query(&format!("SELECT {} FROM groups WHERE id = ?", GROUP_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;

        row.map(|r| Self::row_to_group(&r)).transpose()
    }

    /// Gets a group by full path.
    pub async fn get_by_full_path(pool: &DbPool, full_path: &str) -> Result<Option<Group>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM groups WHERE full_path = ?",
            GROUP_COLUMNS
        ))
        .bind(full_path)
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_group(&r)).transpose()
    }

    /// Updates a group's settings.
    pub async fn update(pool: &DbPool, group: &Group) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE groups SET drift_detection_enabled = ?, updated_at = ? WHERE id = ?",
        )
        .bind(group.drift_detection_enabled)
        .bind(&now)
        .bind(group.id.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }

    fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> Result<Group> {
        let id_str: String = row.get("id");
        let parent_id_str: Option<String> = row.get("parent_id");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Group {
            id: GroupId::from_string(&id_str).map_err(decode_err)?,
            name: row.get("name"),
            full_path: row.get("full_path"),
            parent_id: parent_id_str
                .map(|s| GroupId::from_string(&s).map_err(decode_err))
                .transpose()?,
            drift_detection_enabled: row.get("drift_detection_enabled"),
            created_at: parse_timestamp("group.created_at", &created_at_str)?,
            updated_at: parse_timestamp("group.updated_at", &updated_at_str)?,
        })
    }
}

/// A page of workspaces eligible for drift assessment.
#[derive(Debug)]
pub struct AssessmentCandidatePage {
    pub workspaces: Vec<Workspace>,
    /// Cursor for the next page; `None` when pagination is exhausted.
    pub next_cursor: Option<String>,
}

/// Workspace database operations.
pub struct WorkspaceRepo;

impl WorkspaceRepo {
    /// Creates a new workspace.
    pub async fn create(pool: &DbPool, workspace: &Workspace) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workspaces (
                id, name, full_path, group_id, locked, current_state_version_id,
                drift_detection_enabled, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(workspace.id.to_string())
        .bind(&workspace.name)
        .bind(&workspace.full_path)
        .bind(workspace.group_id.to_string())
        .bind(workspace.locked)
        .bind(&workspace.current_state_version_id)
        .bind(workspace.drift_detection_enabled)
        .bind(workspace.created_at.to_rfc3339())
        .bind(workspace.updated_at.to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Gets a workspace by ID.
    pub async fn get_by_id(pool: &DbPool, id: &WorkspaceId) -> Result<Option<Workspace>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workspaces WHERE id = ?",
            WORKSPACE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_workspace(&r)).transpose()
    }

    /// Updates a workspace's mutable fields.
    pub async fn update(pool: &DbPool, workspace: &Workspace) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE workspaces SET
                locked = ?, current_state_version_id = ?, drift_detection_enabled = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(workspace.locked)
        .bind(&workspace.current_state_version_id)
        .bind(workspace.drift_detection_enabled)
        .bind(&now)
        .bind(workspace.id.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Fetches one keyset page of workspaces eligible for drift assessment:
    /// unlocked, holding a current state version, and whose last assessment
    /// started before `assessed_before` (or never started). Ordered by full
    /// path ascending.
    pub async fn list_assessment_candidates(
        pool: &DbPool,
        cursor: Option<&str>,
        page_size: u32,
        assessed_before: DateTime<Utc>,
    ) -> Result<AssessmentCandidatePage> {
        let rows = sqlx::query(
            r#"
            SELECT w.id, w.name, w.full_path, w.group_id, w.locked,
                   w.current_state_version_id, w.drift_detection_enabled,
                   w.created_at, w.updated_at
            FROM workspaces w
            LEFT JOIN workspace_assessments a ON a.workspace_id = w.id
            WHERE w.locked = 0
              AND w.current_state_version_id IS NOT NULL
              AND (a.started_at IS NULL OR a.started_at < ?)
              AND w.full_path > ?
            ORDER BY w.full_path ASC
            LIMIT ?
            "#,
        )
        .bind(assessed_before.to_rfc3339())
        .bind(cursor.unwrap_or(""))
        .bind(page_size as i64 + 1)
        .fetch_all(pool)
        .await?;

        let mut workspaces: Vec<Workspace> = rows
            .iter()
            .map(Self::row_to_workspace)
            .collect::<Result<_>>()?;

        let next_cursor = if workspaces.len() > page_size as usize {
            workspaces.truncate(page_size as usize);
            workspaces.last().map(|w| w.full_path.clone())
        } else {
            None
        };

        Ok(AssessmentCandidatePage {
            workspaces,
            next_cursor,
        })
    }

    fn row_to_workspace(row: &sqlx::sqlite::SqliteRow) -> Result<Workspace> {
        let id_str: String = row.get("id");
        let group_id_str: String = row.get("group_id");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Workspace {
            id: WorkspaceId::from_string(&id_str).map_err(decode_err)?,
            name: row.get("name"),
            full_path: row.get("full_path"),
            group_id: GroupId::from_string(&group_id_str).map_err(decode_err)?,
            locked: row.get("locked"),
            current_state_version_id: row.get("current_state_version_id"),
            drift_detection_enabled: row.get("drift_detection_enabled"),
            created_at: parse_timestamp("workspace.created_at", &created_at_str)?,
            updated_at: parse_timestamp("workspace.updated_at", &updated_at_str)?,
        })
    }
}
