use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-facing error taxonomy. Everything is converted to an HTTP status
/// with a `detail` message at the boundary; nothing is retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("Invalid or missing API key")]
    Auth,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Google token refresh failed: {0}")]
    ProviderAuth(String),

    #[error("drive api error: status={status}, body={body}")]
    Provider { status: StatusCode, body: String },

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ProviderAuth(_)
            | ApiError::Provider { .. }
            | ApiError::Http(_)
            | ApiError::Serialization(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
