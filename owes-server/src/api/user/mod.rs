//! User API handlers.
//!
//! These endpoints require no authentication; they expose read-only
//! lifecycle state plus the idempotent bootstrap trigger.
//!
//! # Endpoints
//!
//! - `GET  /status` – ledger snapshot and orchestrator state
//! - `GET  /bets`   – completed bets
//! - `POST /start`  – start the stage loops (no-op if already running)

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

mod list_bets;
mod start;
mod status;

/// Build the User API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/bets", get(list_bets::list_bets))
        .route("/start", post(start::start))
}
