//! Response types: pretty-printed JSON bodies and the error envelope.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use crate::error::Error;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// JSON body rendered with indentation; keys keep their insertion order.
pub struct Pretty<T>(pub T);

impl<T: Serialize> IntoResponse for Pretty<T> {
    fn into_response(self) -> Response {
        render(StatusCode::OK, &self.0)
    }
}

/// `{"success": true}`.
pub fn success() -> Pretty<serde_json::Value> {
    Pretty(json!({ "success": true }))
}

/// Control-plane error rendered as `{"success": false, "error": code, "message": text}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::UnknownTask(_) => StatusCode::NOT_FOUND,
            Error::UnknownOrProtectedTask => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::IsolationUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Filesystem(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::ScanInProgress(_) => StatusCode::CONFLICT,
            Error::InvalidArtifactPath => StatusCode::BAD_REQUEST,
            Error::ArtifactNotFound => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::RouteNotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = ?self.0, "Request failed");
        } else {
            debug!(code = self.0.code(), error = %self.0, "Request rejected");
        }

        let body = json!({
            "success": false,
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        render(status, &body)
    }
}

fn render<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_string_pretty(body) {
        Ok(text) => {
            let mut response = (status, text).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(JSON_CONTENT_TYPE),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
