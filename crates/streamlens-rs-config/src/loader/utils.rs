//! Path helpers shared by the layered loader.

use std::path::{Path, PathBuf};

/// Canonicalize a path, falling back to the input when it does not exist yet.
pub(super) fn normalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Record a path as seen; returns false if it was already recorded.
pub(super) fn unique_path(seen: &mut Vec<PathBuf>, candidate: &Path) -> bool {
    let normalized = normalize_path(candidate);
    if seen.contains(&normalized) {
        return false;
    }
    seen.push(normalized);
    true
}

/// Walk up from `start` looking for a directory containing one of `markers`.
pub(super) fn find_project_root(start: &Path, markers: &[&str]) -> Option<PathBuf> {
    for dir in start.ancestors() {
        for marker in markers {
            if dir.join(marker).exists() {
                return Some(dir.to_path_buf());
            }
        }
    }
    None
}
