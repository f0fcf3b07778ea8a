//! Database operations for VCS providers.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{decode_err, parse_timestamp, parse_timestamp_opt, DbPool};
use crate::error::Result;
use crate::models::{GroupId, VcsProvider, VcsProviderId};

const PROVIDER_COLUMNS: &str = r#"id, name, description, group_id, resource_path, url, kind,
       oauth_client_id, oauth_client_secret, oauth_state, oauth_access_token,
       oauth_refresh_token, oauth_token_expires_at, auto_create_webhooks,
       read_write_scope, created_at, updated_at"#;

/// VCS provider database operations.
pub struct VcsProviderRepo;

impl VcsProviderRepo {
    /// Creates a new VCS provider.
    pub async fn create(pool: &DbPool, provider: &VcsProvider) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vcs_providers (
                id, name, description, group_id, resource_path, url, kind,
                oauth_client_id, oauth_client_secret, oauth_state, oauth_access_token,
                oauth_refresh_token, oauth_token_expires_at, auto_create_webhooks,
                read_write_scope, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(provider.id.to_string())
        .bind(&provider.name)
        .bind(&provider.description)
        .bind(provider.group_id.to_string())
        .bind(&provider.resource_path)
        .bind(&provider.url)
        .bind(provider.kind.as_str())
        .bind(&provider.oauth_client_id)
        .bind(&provider.oauth_client_secret)
        .bind(provider.oauth_state.map(|s| s.to_string()))
        .bind(&provider.oauth_access_token)
        .bind(&provider.oauth_refresh_token)
        .bind(provider.oauth_token_expires_at.map(|t| t.to_rfc3339()))
        .bind(provider.auto_create_webhooks)
        .bind(provider.read_write_scope)
        .bind(provider.created_at.to_rfc3339())
        .bind(provider.updated_at.to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Gets a provider by ID.
    pub async fn get_by_id(pool: &DbPool, id: &VcsProviderId) -> Result<Option<VcsProvider>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM vcs_providers WHERE id = ?",
            PROVIDER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_provider(&r)).transpose()
    }

    /// Gets a provider by its pending OAuth state.
    pub async fn get_by_oauth_state(pool: &DbPool, state: &Uuid) -> Result<Option<VcsProvider>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM vcs_providers WHERE oauth_state = ?",
            PROVIDER_COLUMNS
        ))
        .bind(state.to_string())
        .fetch_optional(pool)
        .await?;

        row.map(|r| Self::row_to_provider(&r)).transpose()
    }

    /// Lists providers owned by a group.
    pub async fn list_for_group(pool: &DbPool, group_id: &GroupId) -> Result<Vec<VcsProvider>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM vcs_providers WHERE group_id = ? ORDER BY name ASC",
            PROVIDER_COLUMNS
        ))
        .bind(group_id.to_string())
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::row_to_provider).collect()
    }

    /// Counts providers owned by a group.
    pub async fn count_for_group(pool: &DbPool, group_id: &GroupId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM vcs_providers WHERE group_id = ?")
            .bind(group_id.to_string())
            .fetch_one(pool)
            .await?;

        Ok(row.get("n"))
    }

    /// Updates a provider's mutable fields, including the OAuth runtime.
    pub async fn update(pool: &DbPool, provider: &VcsProvider) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE vcs_providers SET
                name = ?, description = ?, resource_path = ?, url = ?,
                oauth_client_id = ?, oauth_client_secret = ?, oauth_state = ?,
                oauth_access_token = ?, oauth_refresh_token = ?,
                oauth_token_expires_at = ?, auto_create_webhooks = ?,
                read_write_scope = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&provider.name)
        .bind(&provider.description)
        .bind(&provider.resource_path)
        .bind(&provider.url)
        .bind(&provider.oauth_client_id)
        .bind(&provider.oauth_client_secret)
        .bind(provider.oauth_state.map(|s| s.to_string()))
        .bind(&provider.oauth_access_token)
        .bind(&provider.oauth_refresh_token)
        .bind(provider.oauth_token_expires_at.map(|t| t.to_rfc3339()))
        .bind(provider.auto_create_webhooks)
        .bind(provider.read_write_scope)
        .bind(&now)
        .bind(provider.id.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Deletes a provider. Dependent links cascade.
    pub async fn delete(pool: &DbPool, id: &VcsProviderId) -> Result<()> {
        sqlx::query("DELETE FROM vcs_providers WHERE id = ?")
            .bind(id.to_string())
            .execute(pool)
            .await?;

        Ok(())
    }

    fn row_to_provider(row: &sqlx::sqlite::SqliteRow) -> Result<VcsProvider> {
        let id_str: String = row.get("id");
        let group_id_str: String = row.get("group_id");
        let kind_str: String = row.get("kind");
        let state_str: Option<String> = row.get("oauth_state");
        let expires_at_str: Option<String> = row.get("oauth_token_expires_at");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(VcsProvider {
            id: VcsProviderId::from_string(&id_str).map_err(decode_err)?,
            name: row.get("name"),
            description: row.get("description"),
            group_id: GroupId::from_string(&group_id_str).map_err(decode_err)?,
            resource_path: row.get("resource_path"),
            url: row.get("url"),
            kind: kind_str.parse()?,
            oauth_client_id: row.get("oauth_client_id"),
            oauth_client_secret: row.get("oauth_client_secret"),
            oauth_state: state_str
                .map(|s| Uuid::parse_str(&s).map_err(decode_err))
                .transpose()?,
            oauth_access_token: row.get("oauth_access_token"),
            oauth_refresh_token: row.get("oauth_refresh_token"),
            oauth_token_expires_at: parse_timestamp_opt(
                "vcs_provider.oauth_token_expires_at",
                expires_at_str,
            )?,
            auto_create_webhooks: row.get("auto_create_webhooks"),
            read_write_scope: row.get("read_write_scope"),
            created_at: parse_timestamp("vcs_provider.created_at", &created_at_str)?,
            updated_at: parse_timestamp("vcs_provider.updated_at", &updated_at_str)?,
        })
    }
}
