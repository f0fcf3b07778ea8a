//! Notification routing.

pub mod failed_run;

use elysium_core::db::notification::{NamespaceMembershipRepo, NotificationPreferenceRepo};
use elysium_core::db::DbPool;
use elysium_core::models::{
    expand_path, NotificationEvent, NotificationPreference, NotificationScope, User, UserId,
};
use elysium_core::Result;

/// Resolves which users to notify about an event in a namespace.
#[derive(Clone)]
pub struct NotificationManager {
    db: DbPool,
}

impl NotificationManager {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Users to notify for `event` under `namespace_path`.
    ///
    /// Members are enumerated along the expanded path. Per user, the most
    /// specific preference decides: All always notifies, None never,
    /// Participate only when the user is a participant, Custom when the
    /// event-specific flag is set. No matching preference defaults to
    /// Participate. Service accounts are excluded.
    pub async fn users_to_notify(
        &self,
        namespace_path: &str,
        participants: &[UserId],
        event: NotificationEvent,
    ) -> Result<Vec<User>> {
        let paths = expand_path(namespace_path);
        let members = NamespaceMembershipRepo::list_users_for_paths(&self.db, &paths).await?;

        let mut recipients = Vec::new();
        for user in members {
            if user.service_account {
                continue;
            }

            let preferences =
                NotificationPreferenceRepo::list_for_user(&self.db, &user.id).await?;
            let scope = select_scope(&preferences, &paths);

            let include = match scope {
                NotificationScope::All => true,
                NotificationScope::None => false,
                NotificationScope::Participate => participants.contains(&user.id),
                NotificationScope::Custom(events) => events.includes(event),
            };
            if include {
                recipients.push(user);
            }
        }

        Ok(recipients)
    }
}

/// Picks the preference for the most specific namespace path, then the
/// global entry, then the Participate default.
fn select_scope(preferences: &[NotificationPreference], paths: &[String]) -> NotificationScope {
    for path in paths {
        if let Some(pref) = preferences
            .iter()
            .find(|p| p.namespace_path.as_deref() == Some(path.as_str()))
        {
            return pref.scope.clone();
        }
    }
    preferences
        .iter()
        .find(|p| p.namespace_path.is_none())
        .map(|p| p.scope.clone())
        .unwrap_or(NotificationScope::Participate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elysium_core::db::user::UserRepo;
    use elysium_core::db::{create_pool, run_migrations};
    use elysium_core::models::CustomEvents;

    async fn setup_user(pool: &DbPool, username: &str, path: &str) -> User {
        let user = User::new(username, &format!("{}@example.com", username));
        UserRepo::create(pool, &user).await.unwrap();
        NamespaceMembershipRepo::add(pool, &user.id, path).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_scope_rules() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let all = setup_user(&pool, "all", "acme").await;
        let nobody = setup_user(&pool, "nobody", "acme").await;
        let participant = setup_user(&pool, "participant", "acme").await;
        let _bystander = setup_user(&pool, "bystander", "acme").await;
        let custom = setup_user(&pool, "custom", "acme").await;

        for (user, scope) in [
            (&all, NotificationScope::All),
            (&nobody, NotificationScope::None),
            (
                &custom,
                NotificationScope::Custom(CustomEvents { failed_run: true }),
            ),
        ] {
            NotificationPreferenceRepo::set(
                &pool,
                &NotificationPreference::new(user.id.clone(), None, scope),
            )
            .await
            .unwrap();
        }

        let manager = NotificationManager::new(pool);
        let recipients = manager
            .users_to_notify(
                "acme/platform/networking",
                &[participant.id.clone()],
                NotificationEvent::FailedRun,
            )
            .await
            .unwrap();

        let names: Vec<&str> = recipients.iter().map(|u| u.username.as_str()).collect();
        assert!(names.contains(&"all"));
        assert!(names.contains(&"participant"));
        assert!(names.contains(&"custom"));
        assert!(!names.contains(&"nobody"));
        // Default Participate without participation.
        assert!(!names.contains(&"bystander"));
    }

    #[tokio::test]
    async fn test_namespace_preference_overrides_global() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let user = setup_user(&pool, "alice", "acme").await;
        NotificationPreferenceRepo::set(
            &pool,
            &NotificationPreference::new(user.id.clone(), None, NotificationScope::All),
        )
        .await
        .unwrap();
        NotificationPreferenceRepo::set(
            &pool,
            &NotificationPreference::new(
                user.id.clone(),
                Some("acme".to_string()),
                NotificationScope::None,
            ),
        )
        .await
        .unwrap();

        let manager = NotificationManager::new(pool);
        let recipients = manager
            .users_to_notify("acme/networking", &[], NotificationEvent::FailedRun)
            .await
            .unwrap();
        assert!(recipients.is_empty());
    }

    #[tokio::test]
    async fn test_service_accounts_excluded() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let mut bot = User::new("bot", "bot@example.com");
        bot.service_account = true;
        UserRepo::create(&pool, &bot).await.unwrap();
        NamespaceMembershipRepo::add(&pool, &bot.id, "acme").await.unwrap();
        NotificationPreferenceRepo::set(
            &pool,
            &NotificationPreference::new(bot.id.clone(), None, NotificationScope::All),
        )
        .await
        .unwrap();

        let manager = NotificationManager::new(pool);
        let recipients = manager
            .users_to_notify("acme/networking", &[], NotificationEvent::FailedRun)
            .await
            .unwrap();
        assert!(recipients.is_empty());
    }
}
