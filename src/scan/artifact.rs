//! Resolution of downloadable files inside a task's working directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve `target/path` inside `base`.
///
/// `target` must be a single plain directory name not starting with `.`;
/// `path` may have several segments but none of them may climb out of
/// `target` (no `..`, no root, no drive prefix).
pub fn resolve_in(base: &Path, target: &str, path: &str) -> Result<PathBuf> {
    if target.is_empty() || target.starts_with('.') || !is_plain(Path::new(target), false) {
        return Err(Error::InvalidArtifactPath);
    }
    if path.is_empty() || !is_plain(Path::new(path), true) {
        return Err(Error::InvalidArtifactPath);
    }
    Ok(base.join(target).join(path))
}

fn is_plain(path: &Path, allow_nested: bool) -> bool {
    let mut count = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => count += 1,
            Component::CurDir if allow_nested => {}
            _ => return false,
        }
    }
    count == 1 || (allow_nested && count > 0)
}

/// Resolve and check that the artifact is an existing regular file.
pub async fn locate(base: &Path, target: &str, path: &str) -> Result<PathBuf> {
    let full = resolve_in(base, target, path)?;
    match tokio::fs::metadata(&full).await {
        Ok(meta) if meta.is_file() => Ok(full),
        _ => Err(Error::ArtifactNotFound),
    }
}
