//! Database operations for users.

use sqlx::Row;

use super::{decode_err, parse_timestamp, DbPool};
use crate::error::Result;
use crate::models::{User, UserId};

const USER_COLUMNS: &str = "id, username, email, service_account, created_at, updated_at";

/// User database operations.
pub struct UserRepo;

impl UserRepo {
    /// Creates a new user.
    pub async fn create(pool: &DbPool, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, service_account, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.service_account)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Gets a user by ID.
    pub async fn get_by_id(pool: &DbPool, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(pool)
            .await?;

        row.map(|r| Self::row_to_user(&r)).transpose()
    }

    /// Gets a user by email address.
    pub async fn get_by_email(pool: &DbPool, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(pool)
            .await?;

        row.map(|r| Self::row_to_user(&r)).transpose()
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};

    #[tokio::test]
    async fn test_get_by_email() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let user = User::new("alice", "alice@example.com");
        UserRepo::create(&pool, &user).await.unwrap();

        let fetched = UserRepo::get_by_email(&pool, "alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, user.id);
        assert!(UserRepo::get_by_email(&pool, "bob@example.com")
            .await
            .unwrap()
            .is_none());
    }
}
