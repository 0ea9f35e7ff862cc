use axum::{Json, extract::State, response::IntoResponse};
use owes_core::ledger::LedgerSnapshot;
use serde::Serialize;

use crate::state::AppState;

/// Response body for `GET /status`.
#[derive(Serialize)]
struct StatusResponse {
    running: bool,
    ledger: LedgerSnapshot,
}

/// `GET /status` — ledger snapshot and orchestrator state.
pub(super) async fn get_status(state: State<AppState>) -> impl IntoResponse {
    let running = state.orchestrator.is_running().await;
    let ledger = state.orchestrator.ledger().snapshot().await;
    Json(StatusResponse { running, ledger })
}
