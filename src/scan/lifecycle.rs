//! Working-directory lifecycle: allocation on scan start, removal on delete/cleanup.
//!
//! `delete` removes a task's artifacts but keeps the task registered, so it can
//! be started again with a fresh directory. Registry-level removal (`destroy`)
//! never touches the filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{FilesystemError, Result};
use crate::task::{TaskId, TaskRegistry};

/// Prefix of every allocated working directory.
pub const WORKDIR_PREFIX: &str = "scanctl-";

/// Allocate a fresh, uniquely named working directory under `root`
/// (the OS temp dir when `None`). The directory outlives this call.
pub fn allocate_working_dir(root: Option<&Path>) -> Result<PathBuf> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORKDIR_PREFIX);

    let dir = match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(FilesystemError::Allocate)?;

    Ok(dir.keep())
}

/// Recursively remove a working directory. A directory that is already gone is not an error.
pub async fn remove_working_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "Working directory removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to remove working directory");
            Err(FilesystemError::Remove(e).into())
        }
    }
}

/// Remove a task's working directory, keeping the task registered.
pub async fn delete_artifacts(registry: &TaskRegistry, id: &TaskId) -> Result<()> {
    let Some(dir) = registry.with_task(id, |t| t.working_dir.clone()).await? else {
        return Ok(());
    };

    remove_working_dir(&dir).await?;

    // A concurrent start may already have replaced the directory.
    registry
        .update(id, |t| {
            if t.working_dir.as_ref() == Some(&dir) {
                t.working_dir = None;
            }
        })
        .await?;

    info!(task_id = %id, "Scan artifacts deleted");
    Ok(())
}

/// Drop every non-admin task without touching the filesystem.
pub async fn flush(registry: &TaskRegistry) -> Result<usize> {
    registry.reset(false).await
}

/// Remove every task's working directory, then flush.
pub async fn cleanup(registry: &TaskRegistry) -> Result<usize> {
    registry.reset(true).await
}
