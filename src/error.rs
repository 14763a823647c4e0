//! Error types for scanctl.

use crate::task::TaskId;

/// Top-level error type for control-plane operations.
///
/// Every variant is terminal for the request that produced it. Messages are
/// safe to show to clients: they carry task identities (which the caller
/// already holds) but never filesystem paths or OS error text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown task ID {0}")]
    UnknownTask(TaskId),

    #[error("Invalid task ID")]
    UnknownOrProtectedTask,

    #[error("Access denied")]
    Unauthorized,

    #[error("Process isolation is unavailable: {reason}")]
    IsolationUnavailable { reason: String },

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    #[error("A scan is already running for task {0}")]
    ScanInProgress(TaskId),

    #[error("Invalid artifact path")]
    InvalidArtifactPath,

    #[error("Artifact not found")]
    ArtifactNotFound,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Nothing here")]
    RouteNotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl Error {
    /// Short machine-readable code used in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTask(_) => "unknown_task",
            Self::UnknownOrProtectedTask => "invalid_task",
            Self::Unauthorized => "unauthorized",
            Self::IsolationUnavailable { .. } => "isolation_unavailable",
            Self::Filesystem(_) => "filesystem_error",
            Self::ScanInProgress(_) => "scan_in_progress",
            Self::InvalidArtifactPath => "invalid_artifact_path",
            Self::ArtifactNotFound => "artifact_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RouteNotFound => "route_not_found",
            Self::MethodNotAllowed => "method_not_allowed",
        }
    }
}

/// Filesystem failures while allocating or removing working directories.
///
/// The underlying `io::Error` is kept for logging only; `Display` stays generic.
#[derive(Debug, thiserror::Error)]
pub enum FilesystemError {
    #[error("could not allocate a working directory")]
    Allocate(#[source] std::io::Error),

    #[error("could not remove a working directory")]
    Remove(#[source] std::io::Error),

    #[error("could not write scan input")]
    WriteInput(#[source] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid option schema: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, Error>;
