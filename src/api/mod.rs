//! HTTP gateway — thin axum bindings over the control plane.

pub mod response;
pub mod routes;

pub use response::{ApiError, Pretty};
pub use routes::api_routes;
