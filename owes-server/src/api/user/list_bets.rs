use axum::{Json, extract::State, response::IntoResponse};

use crate::state::AppState;

/// `GET /bets` — completed bets, oldest first.
pub(super) async fn list_bets(state: State<AppState>) -> impl IntoResponse {
    let completed = state.orchestrator.ledger().completed_bets().await;
    Json(completed)
}
