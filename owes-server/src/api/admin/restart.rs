use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

/// Response body for `POST /restart`.
#[derive(Serialize)]
struct RestartResponse {
    running: bool,
}

/// `POST /restart` — stop and restart all stage loops.
///
/// Pending bets stay in the ledger across the restart.
pub(super) async fn restart(state: State<AppState>, _auth: AdminAuth) -> impl IntoResponse {
    tracing::info!("Admin requested orchestrator restart");
    state.orchestrator.restart().await;
    Json(RestartResponse {
        running: state.orchestrator.is_running().await,
    })
}
