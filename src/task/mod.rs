//! Task model — identities, option sets, the registry and the admin authority.
//!
//! - `id` — unguessable task identities
//! - `options` — per-task option values with forced safety options
//! - `schema` — recognized option names, types and defaults
//! - `model` — the `Task` record
//! - `registry` — synchronized task map with the admin task pinned
//! - `admin` — privileged identity checks

pub mod admin;
pub mod id;
pub mod model;
pub mod options;
pub mod registry;
pub mod schema;

pub use admin::AdminAuthority;
pub use id::TaskId;
pub use model::{Task, TaskSummary};
pub use options::{OptionSet, OptionValue};
pub use registry::TaskRegistry;
pub use schema::{OptionSchema, OptionType};
