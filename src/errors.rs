use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;

/// Short message returned to callers on unexpected failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "Error interno al procesar el diagnóstico";

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Missing or wrong bearer token.
    Unauthorized(String),
    /// A required secret is not configured on the server.
    ServerMisconfigured(String),
    /// Request body could not be read as a profile.
    BadRequest(String),
    /// Request body exceeds the accepted size.
    PayloadTooLarge(String),
    /// Per-client request quota exhausted; carries the seconds to wait.
    TooManyRequests(u64),
    /// The financing matrix file does not exist.
    DataSourceMissing(PathBuf),
    /// The financing matrix exists but could not be parsed.
    MatrixRead(String),
    /// Internal server error.
    InternalError(String),
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::ServerMisconfigured(msg) => write!(f, "Server misconfigured: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            AppError::TooManyRequests(wait) => {
                write!(f, "Too many requests, retry in {}s", wait)
            }
            AppError::DataSourceMissing(path) => {
                write!(f, "Matrix file not found: {}", path.display())
            }
            AppError::MatrixRead(msg) => write!(f, "Matrix read error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Auth and configuration problems answer with a bare `error` body.
    /// Pipeline failures keep the diagnosis shape (`status`, `recomendaciones`)
    /// and never leak internal detail.
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Unauthorized" })),
                )
                    .into_response()
            }
            AppError::ServerMisconfigured(msg) => {
                tracing::error!("Server misconfigured: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": msg })),
                )
                    .into_response()
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            AppError::PayloadTooLarge(msg) => {
                tracing::warn!("Rejected request body: {}", msg);
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(json!({ "error": msg })),
                )
                    .into_response()
            }
            AppError::TooManyRequests(wait) => {
                tracing::warn!("Rate limit exceeded, retry in {}s", wait);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": self.to_string() })),
                )
                    .into_response()
            }
            AppError::DataSourceMissing(_)
            | AppError::MatrixRead(_)
            | AppError::InternalError(_) => {
                tracing::error!("Diagnosis pipeline failed: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "status": "error",
                        "error": INTERNAL_ERROR_MESSAGE,
                        "recomendaciones": [],
                    })),
                )
                    .into_response()
            }
        }
    }
}

impl From<calamine::Error> for AppError {
    fn from(err: calamine::Error) -> Self {
        AppError::MatrixRead(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::MatrixRead(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("Background task failed: {}", err))
    }
}
