//! Task data model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::TaskId;
use super::options::OptionSet;
use crate::scan::capture::CaptureChannel;
use crate::scan::state::{ScanHandle, ScanReport};

/// A client-owned unit of configurable, independently executable work.
///
/// Cloning a task shares its capture buffers and scan handle.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub options: OptionSet,
    /// Private scratch directory of the most recent scan, if any.
    pub working_dir: Option<PathBuf>,
    pub capture: CaptureChannel,
    pub scan: ScanHandle,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, options: OptionSet, capture_limit: usize) -> Self {
        Self {
            id,
            options,
            working_dir: None,
            capture: CaptureChannel::new(capture_limit),
            scan: ScanHandle::new(),
            created_at: Utc::now(),
        }
    }

    /// Admin-facing view. Never includes the working directory path.
    pub async fn summary(&self) -> TaskSummary {
        TaskSummary {
            created_at: self.created_at,
            scan: self.scan.report().await,
            has_artifacts: self.working_dir.is_some(),
            options: self.options.clone(),
        }
    }
}

/// Read-only task view returned by the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub created_at: DateTime<Utc>,
    pub scan: ScanReport,
    pub has_artifacts: bool,
    pub options: OptionSet,
}
