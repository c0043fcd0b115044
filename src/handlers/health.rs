use axum::{extract::State, http::StatusCode, response::Response};
use serde::Serialize;

use crate::{error::Result, handlers::sessions::json_response, state::AppState};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: String,
}

/// Reports whether the store answers.
pub async fn health(State(state): State<AppState>) -> Result<Response> {
    state.sessions.store().ping().await?;
    json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok",
            store: format!("{:?}", state.sessions.store().topology()),
        },
    )
}
