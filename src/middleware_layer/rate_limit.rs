use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::state::AppState;

/// Extracts the real IP address from the request extensions.
///
/// # Arguments
///
/// * `req` - The incoming request.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A middleware that rate limits session issuance per client IP.
///
/// A limit of zero disables the check.
pub async fn rate_limit_issue(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let per_minute = state.config.issue_rate_limit_per_minute;
    if per_minute == 0 {
        return next.run(req).await;
    }

    let key = format!("issue:{}", extract_real_ip(&req));
    match state.limiter.allow_per_minute(&key, per_minute).await {
        Ok(_) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}
