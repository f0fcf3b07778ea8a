//! Database operations for workspace VCS provider links.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{decode_err, parse_timestamp, DbPool};
use crate::error::{ElysiumError, Result};
use crate::models::{LinkId, VcsProviderId, WorkspaceId, WorkspaceVcsProviderLink};

const LINK_COLUMNS: &str = r#"id, provider_id, workspace_id, repository_path, branch,
       module_directory, tag_regex, glob_patterns, auto_speculative_plan,
       webhook_disabled, webhook_id, token_nonce, created_at, updated_at"#;

/// Workspace VCS provider link database operations.
pub struct LinkRepo;

impl LinkRepo {
    /// Creates a new link. A second link for the same workspace is a
    /// conflict.
    pub async fn create(pool: &DbPool, link: &WorkspaceVcsProviderLink) -> Result<()> {
        let globs = serde_json::to_string(&link.glob_patterns)?;
        let result = sqlx::query(
            r#"
            INSERT INTO workspace_vcs_provider_links (
                id, provider_id, workspace_id, repository_path, branch,
                module_directory, tag_regex, glob_patterns, auto_speculative_plan,
                webhook_disabled, webhook_id, token_nonce, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(link.id.to_string())
        .bind(link.provider_id.to_string())
        .bind(link.workspace_id.to_string())
        .bind(&link.repository_path)
        .bind(&link.branch)
        .bind(&link.module_directory)
        .bind(&link.tag_regex)
        .bind(&globs)
        .bind(link.auto_speculative_plan)
        .bind(link.webhook_disabled)
        .bind(&link.webhook_id)
        .bind(link.token_nonce.to_string())
        .bind(link.created_at.to_rfc3339())
        .bind(link.updated_at.to_rfc3339())
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(ElysiumError::Conflict(format!(
                    "workspace {} already has a VCS provider link",
                    link.workspace_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gets a link by ID.
    pub async fn get_by_id(pool: &DbPool, id: &LinkId) -> Result<Option<WorkspaceVcsProviderLink>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workspace_vcs_provider_links WHERE id = ?",
            LINK_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_link(&r)).transpose()
    }

    /// Gets the link for a workspace, if one exists.
    pub async fn get_by_workspace(
        pool: &DbPool,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<WorkspaceVcsProviderLink>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workspace_vcs_provider_links WHERE workspace_id = ?",
            LINK_COLUMNS
        ))
        .bind(workspace_id.to_string())
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_link(&r)).transpose()
    }

    /// Lists links referencing a provider.
    pub async fn list_for_provider(
        pool: &DbPool,
        provider_id: &VcsProviderId,
    ) -> Result<Vec<WorkspaceVcsProviderLink>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workspace_vcs_provider_links WHERE provider_id = ? ORDER BY created_at ASC",
            LINK_COLUMNS
        ))
        .bind(provider_id.to_string())
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::row_to_link).collect()
    }

    /// Updates a link's mutable fields.
    pub async fn update(pool: &DbPool, link: &WorkspaceVcsProviderLink) -> Result<()> {
        let globs = serde_json::to_string(&link.glob_patterns)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE workspace_vcs_provider_links SET
                branch = ?, module_directory = ?, tag_regex = ?, glob_patterns = ?,
                auto_speculative_plan = ?, webhook_disabled = ?, webhook_id = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&link.branch)
        .bind(&link.module_directory)
        .bind(&link.tag_regex)
        .bind(&globs)
        .bind(link.auto_speculative_plan)
        .bind(link.webhook_disabled)
        .bind(&link.webhook_id)
        .bind(&now)
        .bind(link.id.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Deletes a link.
    pub async fn delete(pool: &DbPool, id: &LinkId) -> Result<()> {
        sqlx::query("DELETE FROM workspace_vcs_provider_links WHERE id = ?")
            .bind(id.to_string())
            .execute(pool)
            .await?;

        Ok(())
    }

    fn row_to_link(row: &sqlx::sqlite::SqliteRow) -> Result<WorkspaceVcsProviderLink> {
        let id_str: String = row.get("id");
        let provider_id_str: String = row.get("provider_id");
        let workspace_id_str: String = row.get("workspace_id");
        let globs_str: String = row.get("glob_patterns");
        let nonce_str: String = row.get("token_nonce");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(WorkspaceVcsProviderLink {
            id: LinkId::from_string(&id_str).map_err(decode_err)?,
            provider_id: VcsProviderId::from_string(&provider_id_str).map_err(decode_err)?,
            workspace_id: WorkspaceId::from_string(&workspace_id_str).map_err(decode_err)?,
            repository_path: row.get("repository_path"),
            branch: row.get("branch"),
            module_directory: row.get("module_directory"),
            tag_regex: row.get("tag_regex"),
            glob_patterns: serde_json::from_str(&globs_str)?,
            auto_speculative_plan: row.get("auto_speculative_plan"),
            webhook_disabled: row.get("webhook_disabled"),
            webhook_id: row.get("webhook_id"),
            token_nonce: Uuid::parse_str(&nonce_str).map_err(decode_err)?,
            created_at: parse_timestamp("link.created_at", &created_at_str)?,
            updated_at: parse_timestamp("link.updated_at", &updated_at_str)?,
        })
    }
}
