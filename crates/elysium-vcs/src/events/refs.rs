//! Ref classification and filtering.

use regex_lite::Regex;

use elysium_core::models::{VcsEventType, WorkspaceVcsProviderLink};

use super::WebhookEventInput;
use crate::providers::VcsAdapter;

/// Strips the `refs/heads/` or `refs/tags/` prefix from a fully-qualified
/// ref.
pub fn strip_ref_prefix(git_ref: &str) -> &str {
    git_ref
        .strip_prefix("refs/heads/")
        .or_else(|| git_ref.strip_prefix("refs/tags/"))
        .unwrap_or(git_ref)
}

/// True for the all-zero hash hosts send for created or deleted refs.
pub fn is_zero_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.bytes().all(|b| b == b'0')
}

/// True when a reference looks like a full SHA-1 commit hash rather than a
/// branch or tag name.
pub fn looks_like_commit_hash(reference: &str) -> bool {
    reference.len() == 40 && reference.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Decides whether a classified webhook event targets the link.
///
/// Pure function of its inputs:
/// - Tag events match only when the link has a tag regex and the stripped
///   ref matches it.
/// - Merge-request events match only same-repository requests (no forks)
///   with a supported action, on links that opted into speculative plans,
///   targeting the tracked branch.
/// - Branch events match when the stripped ref equals the tracked branch.
pub fn ref_matches(
    event: &WebhookEventInput,
    event_type: VcsEventType,
    link: &WorkspaceVcsProviderLink,
    adapter: &dyn VcsAdapter,
) -> bool {
    match event_type {
        VcsEventType::Tag => {
            let Some(tag_regex) = link.tag_regex.as_deref().filter(|r| !r.is_empty()) else {
                return false;
            };
            let Some(git_ref) = event.git_ref.as_deref() else {
                return false;
            };
            match Regex::new(tag_regex) {
                Ok(re) => re.is_match(strip_ref_prefix(git_ref)),
                // Validated at link creation; a pattern that fails to
                // compile here is a non-match.
                Err(_) => false,
            }
        }
        VcsEventType::MergeRequest => {
            event.source_repository_path.as_deref() == Some(link.repository_path.as_str())
                && event
                    .action
                    .as_deref()
                    .is_some_and(|a| adapter.merge_request_action_supported(a))
                && link.auto_speculative_plan
                && event.target_branch.as_deref() == Some(link.branch.as_str())
        }
        VcsEventType::Branch => event
            .git_ref
            .as_deref()
            .is_some_and(|r| strip_ref_prefix(r) == link.branch),
        VcsEventType::Manual => true,
    }
}
