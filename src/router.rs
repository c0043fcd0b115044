use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

use crate::{handlers, middleware_layer, state::AppState};

/// Session issuance, behind the issuance key and the per-IP issuance limit.
pub fn issue_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(handlers::sessions::issue_session))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_issue_key,
        ))
        // Outermost, so failed key guesses count against the limit too.
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_issue,
        ))
        .with_state(state)
}

/// Routes that require a live session.
pub fn protected_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/sessions/current",
            get(handlers::sessions::current_session).delete(handlers::sessions::revoke_current),
        )
        .route("/api/sessions/device", delete(handlers::sessions::revoke_device))
        .route("/api/sessions/all", delete(handlers::sessions::revoke_all))
        .with_state(state)
}

pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .with_state(state)
}

/// Every route, without the transport-level layers added in `main`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(issue_routes(state.clone()))
        .merge(protected_routes(state.clone()))
        .merge(health_routes(state))
}
