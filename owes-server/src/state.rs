//! Application state shared across all request handlers.

use owes_core::config::ToggleStore;
use owes_core::processors::Orchestrator;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// The stage-task supervisor.
    pub orchestrator: Arc<Orchestrator>,
    /// Feature toggles, shared with the stage tasks.
    pub toggles: ToggleStore,
    /// Argon2 hash of the admin secret (can be reloaded via SIGHUP).
    pub admin_secret_hash: Arc<RwLock<String>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        toggles: ToggleStore,
        admin_secret_hash: String,
    ) -> Self {
        Self {
            orchestrator,
            toggles,
            admin_secret_hash: Arc::new(RwLock::new(admin_secret_hash)),
        }
    }

    /// Replace the admin secret hash (used during SIGHUP reload).
    pub async fn update_admin_secret(&self, new_hash: String) {
        *self.admin_secret_hash.write().await = new_hash;
    }
}
