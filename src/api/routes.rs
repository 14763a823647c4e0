//! REST-JSON endpoints over the control plane.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{Map, Value, json};
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use super::response::{ApiError, Pretty, success};
use crate::control::ControlPlane;
use crate::error::Error;
use crate::task::{OptionValue, TaskId};

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the API router.
pub fn api_routes(plane: Arc<ControlPlane>) -> Router {
    Router::new()
        // tasks
        .route("/task/new", get(task_new))
        .route("/task/{taskid}/destroy", get(task_destroy))
        .route("/task/{taskid}/list", get(task_list))
        .route("/task/{taskid}/flush", get(task_flush))
        // admin
        .route("/status/{taskid}", get(status))
        .route("/cleanup/{taskid}", get(cleanup))
        // options
        .route("/option/{taskid}/list", get(option_list))
        .route("/option/{taskid}/get", post(option_get))
        .route("/option/{taskid}/set", post(option_set))
        // scans
        .route("/scan/{taskid}/start", post(scan_start))
        .route("/scan/{taskid}/status", get(scan_status))
        .route("/scan/{taskid}/output", get(scan_output))
        .route("/scan/{taskid}/log", get(scan_log))
        .route("/scan/{taskid}/delete", get(scan_delete))
        .route("/download/{taskid}/{target}/{*path}", get(download))
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(plane)
        // Security headers go on every response, fallbacks included.
        .layer(
            ServiceBuilder::new()
                .layer(overriding(header::SERVER, "Server"))
                .layer(overriding(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                .layer(overriding(header::X_FRAME_OPTIONS, "DENY"))
                .layer(overriding(header::X_XSS_PROTECTION, "1; mode=block"))
                .layer(overriding(header::PRAGMA, "no-cache"))
                .layer(overriding(header::CACHE_CONTROL, "no-cache"))
                .layer(overriding(header::EXPIRES, "0")),
        )
}

fn overriding(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

/// Parse a request body as a JSON object. An empty body is an empty object.
fn json_object(body: &Bytes) -> ApiResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(Error::InvalidRequest(format!("body must be a JSON object ({e})"))))
}

fn option_updates(body: Map<String, Value>) -> impl Iterator<Item = (String, OptionValue)> {
    body.into_iter().map(|(k, v)| (k, OptionValue::from(v)))
}

// ── Tasks ───────────────────────────────────────────────────────────────

async fn task_new(State(plane): State<Arc<ControlPlane>>) -> Pretty<Value> {
    let taskid = plane.create_task().await;
    Pretty(json!({ "taskid": taskid }))
}

async fn task_destroy(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    plane.destroy_task(&TaskId::from(taskid)).await?;
    Ok(success())
}

async fn task_list(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    let tasks = plane.list_tasks(&TaskId::from(taskid)).await?;
    Ok(Pretty(json!({ "tasks": tasks })))
}

async fn task_flush(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    plane.flush(&TaskId::from(taskid)).await?;
    Ok(success())
}

// ── Admin ───────────────────────────────────────────────────────────────

async fn status(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    let status = plane.status(&TaskId::from(taskid)).await?;
    Ok(Pretty(json!({ "busy": status.busy, "tasks": status.tasks })))
}

async fn cleanup(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    plane.cleanup(&TaskId::from(taskid)).await?;
    Ok(success())
}

// ── Options ─────────────────────────────────────────────────────────────

async fn option_list(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    let options = plane.list_options(&TaskId::from(taskid)).await?;
    Ok(Pretty(json!(options)))
}

async fn option_get(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
    body: Bytes,
) -> ApiResult<Pretty<Value>> {
    let id = TaskId::from(taskid);
    // Task existence is checked before the body is looked at.
    if !plane.registry().contains(&id).await {
        return Err(Error::UnknownTask(id).into());
    }
    let body = json_object(&body)?;
    let name = match body.get("option") {
        Some(Value::String(name)) => name.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let value = plane.get_option(&id, &name).await?;
    let mut out = Map::new();
    out.insert(name, json!(value));
    Ok(Pretty(Value::Object(out)))
}

async fn option_set(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
    body: Bytes,
) -> ApiResult<Pretty<Value>> {
    let id = TaskId::from(taskid);
    if !plane.registry().contains(&id).await {
        return Err(Error::UnknownTask(id).into());
    }
    let body = json_object(&body)?;
    plane.set_options(&id, option_updates(body)).await?;
    Ok(success())
}

// ── Scans ───────────────────────────────────────────────────────────────

async fn scan_start(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
    body: Bytes,
) -> ApiResult<Pretty<Value>> {
    let id = TaskId::from(taskid);
    if !plane.registry().contains(&id).await {
        return Err(Error::UnknownTask(id).into());
    }
    let body = json_object(&body)?;
    info!(task_id = %id, "Starting a scan");
    plane.start_scan(&id, option_updates(body)).await?;
    Ok(success())
}

async fn scan_status(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    let report = plane.scan_status(&TaskId::from(taskid)).await?;
    Ok(Pretty(json!({
        "status": report.status,
        "returncode": report.returncode,
    })))
}

async fn scan_output(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    let output = plane.read_output(&TaskId::from(taskid)).await?;
    Ok(Pretty(json!({ "output": output })))
}

async fn scan_log(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    let log = plane.read_log(&TaskId::from(taskid)).await?;
    Ok(Pretty(json!({ "log": log })))
}

async fn scan_delete(
    State(plane): State<Arc<ControlPlane>>,
    Path(taskid): Path<String>,
) -> ApiResult<Pretty<Value>> {
    plane.delete_scan(&TaskId::from(taskid)).await?;
    Ok(success())
}

async fn download(
    State(plane): State<Arc<ControlPlane>>,
    Path((taskid, target, path)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let file = plane
        .resolve_artifact(&TaskId::from(taskid), &target, &path)
        .await?;
    let bytes = tokio::fs::read(&file)
        .await
        .map_err(|_| ApiError(Error::ArtifactNotFound))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

// ── Fallbacks ───────────────────────────────────────────────────────────

async fn route_not_found() -> ApiError {
    ApiError(Error::RouteNotFound)
}

async fn method_not_allowed() -> ApiError {
    ApiError(Error::MethodNotAllowed)
}
