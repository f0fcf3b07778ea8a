//! Doublestar glob filtering of altered repository paths.

use std::collections::HashSet;
use std::path::Path;

/// Returns true when any altered file matches any of the link's glob
/// patterns.
///
/// Patterns are rooted at the repository directory: each compiles as
/// `{repo_dir}/{glob}` with the joining slash always present, so patterns
/// with or without a leading slash behave the same. Patterns are validated
/// at link creation; one that fails to compile here is treated as a
/// non-match.
pub fn globs_match(repo_dir: &Path, altered_files: &HashSet<String>, globs: &[String]) -> bool {
    if globs.is_empty() {
        return true;
    }

    let dir = repo_dir.to_string_lossy();
    let dir = dir.trim_end_matches('/');

    for pattern in globs {
        let rooted = format!("{}/{}", dir, pattern.trim_start_matches('/'));
        let compiled = match glob::Pattern::new(&rooted) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Invalid glob pattern '{}': {}", pattern, e);
                continue;
            }
        };

        for file in altered_files {
            let candidate = format!("{}/{}", dir, file.trim_start_matches('/'));
            if compiled.matches(&candidate) {
                return true;
            }
        }
    }

    false
}
