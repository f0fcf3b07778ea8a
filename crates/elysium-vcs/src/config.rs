//! Runtime configuration for the VCS service and assessment scheduler.

use chrono::Duration;
use url::Url;

/// Default public base URL used when none is configured.
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default repository archive size limit (5 MiB).
const DEFAULT_REPOSITORY_SIZE_LIMIT: u64 = 5 * 1024 * 1024;

/// Default per-group VCS provider limit.
const DEFAULT_PROVIDERS_PER_GROUP: i64 = 5;

/// VCS service configuration.
#[derive(Debug, Clone)]
pub struct VcsConfig {
    /// Public base URL of this deployment; webhook and OAuth callback URLs
    /// are derived from it.
    pub base_url: Url,
    /// Hard cap on downloaded archive bytes.
    pub repository_size_limit: u64,
    /// Maximum VCS providers a single group may own.
    pub providers_per_group_limit: i64,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            repository_size_limit: DEFAULT_REPOSITORY_SIZE_LIMIT,
            providers_per_group_limit: DEFAULT_PROVIDERS_PER_GROUP,
        }
    }
}

impl VcsConfig {
    /// Loads config from environment variables with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ELYSIUM_BASE_URL") {
            match Url::parse(&val) {
                Ok(url) => config.base_url = url,
                Err(e) => tracing::warn!("Invalid ELYSIUM_BASE_URL {}: {}", val, e),
            }
        }

        if let Ok(val) = std::env::var("ELYSIUM_REPOSITORY_SIZE_LIMIT") {
            if let Ok(v) = val.parse() {
                config.repository_size_limit = v;
            }
        }

        if let Ok(val) = std::env::var("ELYSIUM_PROVIDERS_PER_GROUP_LIMIT") {
            if let Ok(v) = val.parse() {
                config.providers_per_group_limit = v;
            }
        }

        config
    }

    /// The webhook ingress URL hosts deliver events to.
    ///
    /// # Panics
    /// Panics if the base URL cannot be joined with the path segment (should
    /// never happen with a valid base URL).
    pub fn webhook_url(&self) -> String {
        self.base_url
            .join("v1/vcs/events")
            .expect("valid base URL should join with path")
            .to_string()
    }

    /// The OAuth callback URL hosts redirect to after authorization.
    pub fn oauth_callback_url(&self) -> String {
        self.base_url
            .join("v1/vcs/auth/callback")
            .expect("valid base URL should join with path")
            .to_string()
    }
}

/// Assessment scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Lower bound of the per-iteration sleep, seconds.
    pub min_sleep_secs: u64,
    /// Upper bound of the per-iteration sleep, seconds.
    pub max_sleep_secs: u64,
    /// Minimum age of a workspace's last assessment before it becomes
    /// eligible again.
    pub assessment_min_interval: Duration,
    /// Maximum in-progress assessments across all replicas.
    pub assessment_run_limit: i64,
    /// Workspaces fetched per scheduler iteration.
    pub page_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_sleep_secs: 60,
            max_sleep_secs: 300,
            assessment_min_interval: Duration::hours(24),
            assessment_run_limit: 10,
            page_size: 100,
        }
    }
}

impl SchedulerConfig {
    /// Loads config from environment variables with defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ELYSIUM_ASSESSMENT_MIN_SLEEP_SECS") {
            if let Ok(v) = val.parse() {
                config.min_sleep_secs = v;
            }
        }

        if let Ok(val) = std::env::var("ELYSIUM_ASSESSMENT_MAX_SLEEP_SECS") {
            if let Ok(v) = val.parse() {
                config.max_sleep_secs = v;
            }
        }

        if let Ok(val) = std::env::var("ELYSIUM_ASSESSMENT_MIN_INTERVAL_HOURS") {
            if let Ok(v) = val.parse::<i64>() {
                config.assessment_min_interval = Duration::hours(v);
            }
        }

        if let Ok(val) = std::env::var("ELYSIUM_ASSESSMENT_RUN_LIMIT") {
            if let Ok(v) = val.parse() {
                config.assessment_run_limit = v;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_urls() {
        let config = VcsConfig {
            base_url: Url::parse("https://elysium.example.com/").unwrap(),
            ..Default::default()
        };
        assert_eq!(config.webhook_url(), "https://elysium.example.com/v1/vcs/events");
        assert_eq!(
            config.oauth_callback_url(),
            "https://elysium.example.com/v1/vcs/auth/callback"
        );
    }
}
