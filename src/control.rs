//! Control plane — the transport-agnostic operation surface.
//!
//! Composes the task registry, the admin authority, the process launcher and
//! the lifecycle helpers. Privileged operations check the caller before
//! touching any state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{ConfigError, Error, Result};
use crate::scan::launcher::ProcessLauncher;
use crate::scan::state::ScanReport;
use crate::scan::{artifact, lifecycle};
use crate::task::{
    AdminAuthority, OptionSchema, OptionSet, OptionValue, TaskId, TaskRegistry, TaskSummary,
};

/// Result of the admin status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    /// Whether any task's worker is currently running.
    pub busy: bool,
    /// Number of registered tasks, the admin task included.
    pub tasks: usize,
}

/// Process-wide control-plane state.
pub struct ControlPlane {
    registry: TaskRegistry,
    admin: AdminAuthority,
    launcher: ProcessLauncher,
}

impl ControlPlane {
    /// Create the control plane; the admin task is registered first.
    pub fn new(schema: OptionSchema, launcher: ProcessLauncher, capture_limit: usize) -> Self {
        let admin = AdminAuthority::generate();
        let registry = TaskRegistry::new(&admin, Arc::new(schema), capture_limit);
        Self {
            registry,
            admin,
            launcher,
        }
    }

    /// Build from configuration (schema file, engine command, scratch root, start mode).
    pub fn from_config(config: &ApiConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let schema = config.load_schema()?;

        let mut launcher = ProcessLauncher::new(config.engine()).blocking(config.blocking_start);
        if let Some(root) = &config.scratch_root {
            launcher = launcher.with_scratch_root(root.clone());
        }

        Ok(Self::new(schema, launcher, config.capture_limit))
    }

    pub fn admin_id(&self) -> &TaskId {
        self.admin.id()
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    // ── Tasks ───────────────────────────────────────────────────────────

    pub async fn create_task(&self) -> TaskId {
        self.registry.create().await
    }

    pub async fn destroy_task(&self, id: &TaskId) -> Result<()> {
        self.registry.destroy(id).await
    }

    pub async fn list_tasks(&self, caller: &TaskId) -> Result<IndexMap<TaskId, TaskSummary>> {
        self.admin.authorize(caller)?;
        let mut listing = IndexMap::new();
        for task in self.registry.list().await {
            let summary = task.summary().await;
            listing.insert(task.id, summary);
        }
        Ok(listing)
    }

    pub async fn flush(&self, caller: &TaskId) -> Result<()> {
        self.admin.authorize(caller)?;
        let dropped = lifecycle::flush(&self.registry).await?;
        info!(dropped, "Tasks flushed");
        Ok(())
    }

    pub async fn cleanup(&self, caller: &TaskId) -> Result<()> {
        self.admin.authorize(caller)?;
        let dropped = lifecycle::cleanup(&self.registry).await?;
        info!(dropped, "Tasks and working directories cleaned up");
        Ok(())
    }

    pub async fn status(&self, caller: &TaskId) -> Result<ServerStatus> {
        self.admin.authorize(caller)?;
        Ok(ServerStatus {
            busy: self.launcher.running() > 0,
            tasks: self.registry.len().await,
        })
    }

    // ── Options ─────────────────────────────────────────────────────────

    pub async fn list_options(&self, id: &TaskId) -> Result<OptionSet> {
        self.registry.with_task(id, |t| t.options.clone()).await
    }

    /// Value of one option; `Null` when the task has no such option.
    pub async fn get_option(&self, id: &TaskId, name: &str) -> Result<OptionValue> {
        self.registry
            .with_task(id, |t| t.options.get(name).cloned().unwrap_or(OptionValue::Null))
            .await
    }

    pub async fn set_options<I>(&self, id: &TaskId, updates: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, OptionValue)>,
    {
        let schema = self.registry.schema();
        self.registry
            .update(id, |t| t.options.merge(updates, schema))
            .await
    }

    // ── Scans ───────────────────────────────────────────────────────────

    pub async fn start_scan<I>(&self, id: &TaskId, requested: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, OptionValue)>,
    {
        self.launcher.start(&self.registry, id, requested).await
    }

    pub async fn scan_status(&self, id: &TaskId) -> Result<ScanReport> {
        let scan = self.registry.with_task(id, |t| t.scan.clone()).await?;
        Ok(scan.report().await)
    }

    /// Destructive read of the task's captured standard output.
    pub async fn read_output(&self, id: &TaskId) -> Result<String> {
        let capture = self.registry.with_task(id, |t| t.capture.clone()).await?;
        Ok(capture.drain_output().await)
    }

    /// Destructive read of the task's captured log lines.
    pub async fn read_log(&self, id: &TaskId) -> Result<String> {
        let capture = self.registry.with_task(id, |t| t.capture.clone()).await?;
        Ok(capture.drain_log().await)
    }

    /// Remove the task's working directory; the task stays registered.
    pub async fn delete_scan(&self, id: &TaskId) -> Result<()> {
        lifecycle::delete_artifacts(&self.registry, id).await
    }

    /// Locate a file produced by the task's most recent scan.
    pub async fn resolve_artifact(&self, id: &TaskId, target: &str, path: &str) -> Result<PathBuf> {
        let workdir = self.registry.with_task(id, |t| t.working_dir.clone()).await?;
        let Some(workdir) = workdir else {
            // Traversal attempts are rejected even when there is nothing to serve.
            artifact::resolve_in(Path::new(""), target, path)?;
            return Err(Error::ArtifactNotFound);
        };
        artifact::locate(&workdir, target, path).await
    }
}
