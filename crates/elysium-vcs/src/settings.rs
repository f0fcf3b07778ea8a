//! Inherited namespace settings.

use elysium_core::db::namespace::GroupRepo;
use elysium_core::db::DbPool;
use elysium_core::models::{expand_path, Workspace};
use elysium_core::Result;

/// A setting value plus where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSetting<T> {
    pub value: T,
    /// True when the value came from an ancestor group rather than the
    /// workspace itself.
    pub inherited: bool,
}

/// Resolves per-workspace effective settings by walking the group
/// hierarchy leaf to root.
#[derive(Clone)]
pub struct InheritedSettingResolver {
    db: DbPool,
}

impl InheritedSettingResolver {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Effective drift-detection setting for a workspace. The workspace's
    /// own setting wins; otherwise the nearest ancestor group with an
    /// explicit value decides, defaulting to disabled.
    pub async fn drift_detection_enabled(
        &self,
        workspace: &Workspace,
    ) -> Result<ResolvedSetting<bool>> {
        if let Some(value) = workspace.drift_detection_enabled {
            return Ok(ResolvedSetting {
                value,
                inherited: false,
            });
        }

        let value = self
            .group_drift_detection(workspace.group_path())
            .await?
            .unwrap_or(false);
        Ok(ResolvedSetting {
            value,
            inherited: true,
        })
    }

    /// First explicit drift-detection value on the group chain, leaf first.
    pub async fn group_drift_detection(&self, group_path: &str) -> Result<Option<bool>> {
        for path in expand_path(group_path) {
            if let Some(group) = GroupRepo::get_by_full_path(&self.db, &path).await? {
                if let Some(value) = group.drift_detection_enabled {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elysium_core::db::namespace::WorkspaceRepo;
    use elysium_core::db::{create_pool, run_migrations};
    use elysium_core::models::Group;

    #[tokio::test]
    async fn test_workspace_setting_wins_over_group() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let mut root = Group::new_root("acme");
        root.drift_detection_enabled = Some(true);
        GroupRepo::create(&pool, &root).await.unwrap();

        let mut workspace = Workspace::new(&root, "networking");
        workspace.drift_detection_enabled = Some(false);
        WorkspaceRepo::create(&pool, &workspace).await.unwrap();

        let resolver = InheritedSettingResolver::new(pool);
        let resolved = resolver.drift_detection_enabled(&workspace).await.unwrap();
        assert!(!resolved.value);
        assert!(!resolved.inherited);
    }

    #[tokio::test]
    async fn test_nearest_ancestor_with_explicit_value_wins() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let mut root = Group::new_root("acme");
        root.drift_detection_enabled = Some(true);
        GroupRepo::create(&pool, &root).await.unwrap();

        let mut team = Group::new_child(&root, "platform");
        team.drift_detection_enabled = Some(false);
        GroupRepo::create(&pool, &team).await.unwrap();

        let workspace = Workspace::new(&team, "networking");
        WorkspaceRepo::create(&pool, &workspace).await.unwrap();

        let resolver = InheritedSettingResolver::new(pool);
        let resolved = resolver.drift_detection_enabled(&workspace).await.unwrap();
        assert!(!resolved.value);
        assert!(resolved.inherited);
    }

    #[tokio::test]
    async fn test_unset_everywhere_defaults_to_disabled() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let root = Group::new_root("acme");
        GroupRepo::create(&pool, &root).await.unwrap();
        let workspace = Workspace::new(&root, "networking");
        WorkspaceRepo::create(&pool, &workspace).await.unwrap();

        let resolver = InheritedSettingResolver::new(pool);
        let resolved = resolver.drift_detection_enabled(&workspace).await.unwrap();
        assert!(!resolved.value);
        assert!(resolved.inherited);
    }
}
