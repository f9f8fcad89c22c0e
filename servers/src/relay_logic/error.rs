use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Request-level failures surfaced to HTTP callers.
///
/// These are the only errors clients ever see; upstream and fan-out failures
/// stay inside the poll/broadcast path and are logged instead.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unauthorized: Invalid API key")]
    Unauthorized,
    #[error("Missing {0} in request body")]
    MissingField(&'static str),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::MissingField(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Failures of a single poll against the source backend. Never surfaced to
/// HTTP callers; the cycle is skipped and the last snapshot stays in place.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("source returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("source payload is not valid JSON: {0}")]
    Malformed(reqwest::Error),
}
