//! Database operations for namespace memberships and notification
//! preferences.

use chrono::Utc;
use sqlx::Row;
use ulid::Ulid;

use super::{decode_err, parse_timestamp, DbPool};
use crate::error::{ElysiumError, Result};
use crate::models::{
    CustomEvents, NotificationPreference, NotificationScope, User, UserId,
};

/// Namespace membership database operations.
pub struct NamespaceMembershipRepo;

impl NamespaceMembershipRepo {
    /// Adds a user membership on a namespace path.
    pub async fn add(pool: &DbPool, user_id: &UserId, namespace_path: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO namespace_memberships (id, user_id, namespace_path, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Ulid::new().to_string())
        .bind(user_id.to_string())
        .bind(namespace_path)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Lists distinct users holding a membership on any of the given
    /// namespace paths.
    pub async fn list_users_for_paths(pool: &DbPool, paths: &[String]) -> Result<Vec<User>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; paths.len()].join(", ");
        let sql = format!(
            r#"
            SELECT DISTINCT u.id, u.username, u.email, u.service_account,
                   u.created_at, u.updated_at
            FROM users u
            JOIN namespace_memberships m ON m.user_id = u.id
            WHERE m.namespace_path IN ({})
            ORDER BY u.username ASC
            "#,
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for path in paths {
            query = query.bind(path);
        }

        let rows = query.fetch_all(pool).await?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("id");
                let created_at_str: String = row.get("created_at");
                let updated_at_str: String = row.get("updated_at");
                Ok(User {
                    id: UserId::from_string(&id_str).map_err(decode_err)?,
                    username: row.get("username"),
                    email: row.get("email"),
                    service_account: row.get("service_account"),
                    created_at: parse_timestamp("user.created_at", &created_at_str)?,
                    updated_at: parse_timestamp("user.updated_at", &updated_at_str)?,
                })
            })
            .collect()
    }
}

/// Notification preference database operations.
pub struct NotificationPreferenceRepo;

impl NotificationPreferenceRepo {
    /// Creates or replaces a user's preference for a namespace path (or the
    /// global preference when the path is `None`).
    pub async fn set(pool: &DbPool, pref: &NotificationPreference) -> Result<()> {
        let custom_events = match &pref.scope {
            NotificationScope::Custom(events) => Some(serde_json::to_string(events)?),
            _ => None,
        };
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO notification_preferences (
                user_id, namespace_path, scope, custom_events, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, namespace_path) DO UPDATE SET
                scope = excluded.scope,
                custom_events = excluded.custom_events,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(pref.user_id.to_string())
        .bind(&pref.namespace_path)
        .bind(pref.scope.as_str())
        .bind(&custom_events)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Lists all preferences for a user.
    pub async fn list_for_user(
        pool: &DbPool,
        user_id: &UserId,
    ) -> Result<Vec<NotificationPreference>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, namespace_path, scope, custom_events, created_at, updated_at
            FROM notification_preferences
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;

        rows.iter().map(Self::row_to_preference).collect()
    }

    fn row_to_preference(row: &sqlx::sqlite::SqliteRow) -> Result<NotificationPreference> {
        let user_id_str: String = row.get("user_id");
        let scope_str: String = row.get("scope");
        let custom_events_str: Option<String> = row.get("custom_events");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        let scope = match scope_str.as_str() {
            "all" => NotificationScope::All,
            "participate" => NotificationScope::Participate,
            "none" => NotificationScope::None,
            "custom" => {
                let events: CustomEvents = custom_events_str
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?
                    .unwrap_or_default();
                NotificationScope::Custom(events)
            }
            other => {
                return Err(ElysiumError::Validation(format!(
                    "Unknown notification scope: {}",
                    other
                )))
            }
        };

        Ok(NotificationPreference {
            user_id: UserId::from_string(&user_id_str).map_err(decode_err)?,
            namespace_path: row.get("namespace_path"),
            scope,
            created_at: parse_timestamp("notification_preference.created_at", &created_at_str)?,
            updated_at: parse_timestamp("notification_preference.updated_at", &updated_at_str)?,
        })
    }
}
