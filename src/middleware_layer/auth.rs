use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::{
    error::{AppError, Result},
    models::session::Session,
    state::AppState,
};

/// Extracts the bearer token from the request headers.
///
/// # Arguments
///
/// * `headers` - The request headers.
/// * `header` - The header carrying the token.
/// * `schema` - The schema that must precede the token, e.g. `Bearer`.
///
/// # Returns
///
/// The token, without the schema.
pub fn extract_bearer_token<'a>(headers: &'a HeaderMap, header: &str, schema: &str) -> Result<&'a str> {
    let value = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Authentication("Missing user token".to_string()))?;

    let token = value
        .strip_prefix(schema)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Authentication("Missing user token".to_string()))?;

    Ok(token)
}

/// The validated session of the caller.
///
/// Extracting it verifies the bearer token and confirms the session is
/// still cached; handlers receive the session as an explicit argument.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        tracing::debug!("🔐 Checking authentication...");

        let token = extract_bearer_token(
            &parts.headers,
            &state.config.auth_header,
            &state.config.auth_header_schema,
        )?;

        let session = state.sessions.validate(token).await?;
        tracing::debug!("✅ User authenticated: {}", session.claims.id);

        Ok(CurrentSession(session))
    }
}

/// Whether `header` carries exactly `expected`, compared in constant time.
pub fn has_issue_key(headers: &HeaderMap, header: &str, expected: &[u8]) -> bool {
    headers
        .get(header)
        .is_some_and(|presented| bool::from(presented.as_bytes().ct_eq(expected)))
}

/// A middleware that only lets callers holding the issuance key through.
pub async fn require_issue_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config;
    if !has_issue_key(req.headers(), &config.issue_key_header, config.issue_api_key.as_bytes()) {
        return AppError::Authentication("Missing or invalid issuance key".to_string()).into_response();
    }
    next.run(req).await
}
