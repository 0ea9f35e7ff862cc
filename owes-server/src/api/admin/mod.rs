//! Admin API handlers.
//!
//! These endpoints require the `Owes-Admin-Authorization` header with the
//! plaintext admin secret.
//!
//! # Endpoints
//!
//! - `POST /restart` – stop and restart all stage loops

use axum::{Router, routing::post};

use crate::state::AppState;

mod restart;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new().route("/restart", post(restart::restart))
}
