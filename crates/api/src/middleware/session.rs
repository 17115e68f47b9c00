//! Session extractors for Axum handlers.

use std::sync::Arc;

use annotator_core::error::CoreError;
use annotator_core::session::Session;
use annotator_core::types::SessionId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Header naming the caller's session.
pub const SESSION_HEADER: &str = "x-session-id";

/// Session id from the `x-session-id` header, not checked against the store.
///
/// Used by lifecycle endpoints that handle unknown ids themselves.
#[derive(Debug, Clone, Copy)]
pub struct SessionIdHeader(pub SessionId);

impl FromRequestParts<AppState> for SessionIdHeader {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::InvalidSession(format!(
                    "missing {SESSION_HEADER} header"
                )))
            })?;

        let id = raw
            .trim()
            .parse()
            .map_err(|_| AppError::Core(CoreError::InvalidSession(raw.to_string())))?;

        Ok(SessionIdHeader(id))
    }
}

/// A live session resolved from the `x-session-id` header.
///
/// ```ignore
/// async fn my_handler(ActiveSession(session): ActiveSession) -> AppResult<Json<()>> {
///     tracing::info!(session_id = %session.id(), "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ActiveSession(pub Arc<Session>);

impl FromRequestParts<AppState> for ActiveSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionIdHeader(id) = SessionIdHeader::from_request_parts(parts, state).await?;
        let session = state.sessions.get(id).await?;
        Ok(ActiveSession(session))
    }
}
