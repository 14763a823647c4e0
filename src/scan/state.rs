//! Scan state machine for a task's worker process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Lifecycle of a task's most recent scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// No scan has been started for this task.
    NotRunning,
    /// A worker process is alive.
    Running,
    /// The worker exited (or its exit status could not be collected).
    Terminated,
}

impl ScanStatus {
    pub fn can_transition_to(&self, target: ScanStatus) -> bool {
        use ScanStatus::*;

        matches!(
            (self, target),
            (NotRunning, Running) | (Running, Terminated) | (Terminated, Running)
        )
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotRunning => "not_running",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of a scan, as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub status: ScanStatus,
    pub returncode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for ScanReport {
    fn default() -> Self {
        Self {
            status: ScanStatus::NotRunning,
            returncode: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Shared handle to a task's scan state; the reaper updates it when the worker exits.
#[derive(Debug, Clone, Default)]
pub struct ScanHandle {
    inner: Arc<Mutex<ScanReport>>,
}

impl ScanHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn report(&self) -> ScanReport {
        self.inner.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.status == ScanStatus::Running
    }

    /// Claim the handle for a new worker.
    ///
    /// Returns the previous report, or `None` if a worker is still running.
    pub async fn try_begin(&self) -> Option<ScanReport> {
        let mut report = self.inner.lock().await;
        if !report.status.can_transition_to(ScanStatus::Running) {
            return None;
        }
        let running = ScanReport {
            status: ScanStatus::Running,
            returncode: None,
            started_at: Some(Utc::now()),
            finished_at: None,
        };
        Some(std::mem::replace(&mut *report, running))
    }

    /// Record the worker's exit. `None` means the exit code is unknown (e.g. killed by a signal).
    pub async fn finish(&self, returncode: Option<i32>) {
        let mut report = self.inner.lock().await;
        report.status = ScanStatus::Terminated;
        report.returncode = returncode;
        report.finished_at = Some(Utc::now());
    }

    /// Undo a claim taken by `try_begin` when the worker never started.
    pub async fn restore(&self, previous: ScanReport) {
        *self.inner.lock().await = previous;
    }
}
