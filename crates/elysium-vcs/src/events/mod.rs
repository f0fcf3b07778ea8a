//! Event ingestion pipeline: classification, filtering, and the async
//! handler that turns repository state into runs.

pub mod archive;
pub mod globs;
pub mod handler;
pub mod refs;

pub use handler::{EventExecution, EventExecutor};

/// Normalized webhook payload fields extracted by the transport layer.
///
/// Hosts deliver very different shapes; only the fields the pipeline needs
/// survive to here.
#[derive(Debug, Clone, Default)]
pub struct WebhookEventInput {
    /// Host event signal: `X-Gitlab-Event` header value for GitLab, the
    /// `X-GitHub-Event` name for GitHub.
    pub event_header: String,
    /// Merge-request action (`open`, `opened`, `synchronize`, ...).
    pub action: Option<String>,
    /// Fully-qualified ref, `refs/heads/...` or `refs/tags/...`.
    pub git_ref: Option<String>,
    /// Commit hash before the push; all zeros for branch creation.
    pub before: Option<String>,
    /// Commit hash after the push; all zeros for branch deletion.
    pub after: Option<String>,
    /// Repository path of the merge request's source project.
    pub source_repository_path: Option<String>,
    /// Merge-request source branch.
    pub source_branch: Option<String>,
    /// Merge-request target branch.
    pub target_branch: Option<String>,
    /// Merge-request head commit.
    pub head_commit_id: Option<String>,
}
