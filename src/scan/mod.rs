//! Scan execution — worker processes, their captured output, and their artifacts.
//!
//! - `launcher` — spawns the engine per task and reaps it
//! - `capture` — per-task stdout/log buffers with destructive reads
//! - `state` — running/terminated status of a task's worker
//! - `lifecycle` — working directory allocation and removal
//! - `artifact` — safe resolution of downloadable files

pub mod artifact;
pub mod capture;
pub mod launcher;
pub mod lifecycle;
pub mod state;

pub use capture::CaptureChannel;
pub use launcher::{EngineCommand, ProcessLauncher};
pub use state::{ScanHandle, ScanReport, ScanStatus};
