//! scanctl — task and scan control plane for an out-of-process scan engine.

pub mod api;
pub mod config;
pub mod control;
pub mod error;
pub mod scan;
pub mod task;
