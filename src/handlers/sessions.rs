use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::CurrentSession,
    models::session::Claims,
    state::AppState,
};

/// The request payload for issuing a session.
#[derive(Deserialize, Debug)]
pub struct IssueSessionRequest {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub device_id: String,
}

/// The response payload for an issued session.
#[derive(Serialize)]
pub struct IssueSessionResponse {
    pub token: String,
    pub session: Claims,
}

/// The response payload for revocations.
#[derive(Serialize)]
pub struct RevokeResponse {
    pub revoked: u64,
}

/// Serializes `body` with sonic-rs into a JSON response.
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response> {
    let body = sonic_rs::to_string(body)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Signs a token for a user on a device and caches it, replacing any
/// earlier session of that device.
pub async fn issue_session(
    State(state): State<AppState>,
    Json(payload): Json<IssueSessionRequest>,
) -> Result<Response> {
    tracing::info!("📝 Session requested for user {} on device {}", payload.id, payload.device_id);

    let session = state
        .sessions
        .sign_and_cache(
            &payload.id,
            &payload.name,
            &payload.kind,
            &payload.device_id,
            &state.config.jwt.issuer,
        )
        .await?;

    json_response(
        StatusCode::CREATED,
        &IssueSessionResponse {
            token: session.token,
            session: session.claims,
        },
    )
}

/// Returns the claims of the caller's session.
pub async fn current_session(CurrentSession(session): CurrentSession) -> Result<Response> {
    json_response(StatusCode::OK, &session.claims)
}

/// Revokes the caller's session.
pub async fn revoke_current(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<StatusCode> {
    let claims = &session.claims;
    state
        .sessions
        .revoke_session(&claims.id, &claims.device_id, claims.issued_at)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revokes every session of the caller's device.
pub async fn revoke_device(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Response> {
    let revoked = state
        .sessions
        .revoke_device(&session.claims.id, &session.claims.device_id)
        .await?;
    json_response(StatusCode::OK, &RevokeResponse { revoked })
}

/// Revokes every session of the caller, on all devices.
pub async fn revoke_all(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Response> {
    let revoked = state.sessions.revoke_user(&session.claims.id).await?;
    json_response(StatusCode::OK, &RevokeResponse { revoked })
}
