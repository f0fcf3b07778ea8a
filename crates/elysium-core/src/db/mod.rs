//! Database module for the Elysium platform.

pub mod assessment;
pub mod event;
pub mod link;
pub mod namespace;
pub mod notification;
pub mod provider;
pub mod user;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::{ElysiumError, Result};

/// Database connection pool.
pub type DbPool = SqlitePool;

/// Default maximum database connections.
const DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// Creates and initializes the database connection pool.
///
/// The pool size can be configured via `DATABASE_MAX_CONNECTIONS`; the
/// default handles concurrent webhook processing and background tasks
/// without exhaustion.
pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    // An in-memory SQLite database exists per connection; a larger pool
    // would hand out empty databases.
    let max_connections = if database_url.contains(":memory:") {
        1
    } else {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
    };

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| ElysiumError::Validation(format!("Invalid database URL: {}", e)))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    tracing::debug!("Database pool created with max_connections={}", max_connections);

    Ok(pool)
}

/// Runs database migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Parses an RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ElysiumError::DateParse {
            field,
            message: e.to_string(),
        })
}

/// Parses an optional RFC 3339 timestamp column.
pub(crate) fn parse_timestamp_opt(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(field, &v)).transpose()
}

/// Wraps a non-sqlx decode failure the way sqlx reports its own.
pub(crate) fn decode_err<E>(e: E) -> ElysiumError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ElysiumError::Database(sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_and_migrate() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("t", "2026-03-01T12:00:00+00:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-01T12:00:00+00:00");
        assert!(parse_timestamp("t", "not-a-date").is_err());
    }
}
