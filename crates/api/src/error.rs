use annotator_core::error::CoreError;
use annotator_core::ffmpeg::FfmpegError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `annotator_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::InvalidSession(id) => (
                    StatusCode::BAD_REQUEST,
                    "INVALID_SESSION",
                    format!("Invalid or expired session: {id}"),
                ),
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::UnsupportedFormat(msg) => (
                    StatusCode::BAD_REQUEST,
                    "UNSUPPORTED_FORMAT",
                    format!("Unsupported format: {msg}"),
                ),
                CoreError::Ffmpeg(err) => classify_ffmpeg_error(err),
                CoreError::Metadata(err) => {
                    tracing::error!(error = %err, "Metadata write failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "METADATA_ERROR",
                        err.to_string(),
                    )
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify an ffmpeg/ffprobe failure into an HTTP status, error code, and message.
///
/// Tool diagnostics are returned to the caller so a failing upload can be
/// reproduced; filesystem errors stay sanitized.
fn classify_ffmpeg_error(err: &FfmpegError) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "Video processing failed");
    match err {
        FfmpegError::ProbeFailed { .. } | FfmpegError::ParseError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "PROBE_FAILED",
            err.to_string(),
        ),
        FfmpegError::DecodeFailed { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "DECODE_FAILED",
            err.to_string(),
        ),
        FfmpegError::NotFound(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "FFMPEG_UNAVAILABLE",
            "Video tooling is not available on this server".to_string(),
        ),
        FfmpegError::IoError(_) | FfmpegError::VideoNotFound(_) => internal(),
    }
}
