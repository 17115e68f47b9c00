//! Handlers for session lifecycle: start, ping and end.

use annotator_core::types::SessionId;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{AppError, AppResult};
use crate::middleware::session::SessionIdHeader;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
}

/// Wall-clock time of a store expiry instant.
fn wall_clock(expires_at: Instant) -> AppResult<DateTime<Utc>> {
    let remaining = expires_at.saturating_duration_since(Instant::now());
    let remaining = chrono::Duration::from_std(remaining)
        .map_err(|e| AppError::InternalError(format!("session expiry out of range: {e}")))?;
    Ok(Utc::now() + remaining)
}

fn session_info(session_id: SessionId, expires_at: Instant) -> AppResult<SessionInfo> {
    Ok(SessionInfo {
        session_id,
        expires_at: wall_clock(expires_at)?,
    })
}

/// POST /api/start-session
pub async fn start_session(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<DataResponse<SessionInfo>>)> {
    let id = state.sessions.create().await?;
    let expires_at = state.sessions.expires_at(id).await?;
    let info = session_info(id, expires_at)?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: info })))
}

/// POST /api/ping-session
///
/// Extends the session named in `x-session-id` by one TTL.
pub async fn ping_session(
    State(state): State<AppState>,
    SessionIdHeader(id): SessionIdHeader,
) -> AppResult<Json<DataResponse<SessionInfo>>> {
    let expires_at = state.sessions.touch(id).await?;
    tracing::debug!(session_id = %id, "Session extended");
    Ok(Json(DataResponse {
        data: session_info(id, expires_at)?,
    }))
}

/// POST /api/end-session
///
/// Deletes the session and every image in it. Ending an unknown session
/// succeeds.
pub async fn end_session(
    State(state): State<AppState>,
    SessionIdHeader(id): SessionIdHeader,
) -> StatusCode {
    state.sessions.delete(id).await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn wall_clock_follows_store_instant() {
        let before = Utc::now();
        let expires = wall_clock(Instant::now() + Duration::from_secs(90)).unwrap();
        let after = Utc::now();

        assert!(expires >= before + chrono::Duration::seconds(89));
        assert!(expires <= after + chrono::Duration::seconds(90));
    }

    #[test]
    fn past_instant_maps_to_now() {
        let before = Utc::now();
        let expires = wall_clock(Instant::now()).unwrap();
        assert!(expires >= before);
        assert!(expires <= Utc::now());
    }
}
