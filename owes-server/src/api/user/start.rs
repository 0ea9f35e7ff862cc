use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

/// Response body for `POST /start`.
#[derive(Serialize)]
struct StartResponse {
    /// False when the stage loops were already running.
    started: bool,
}

/// `POST /start` — idempotent bootstrap trigger.
pub(super) async fn start(state: State<AppState>) -> impl IntoResponse {
    let started = state.orchestrator.start().await;
    Json(StartResponse { started })
}
