//! Owes Server
//!
//! A social-betting escrow bot: watches a social platform for bet
//! challenges, escrows both stakes on chain, and settles or refunds them.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, Secrets};
use owes_core::capabilities::{
    AgentOracle, EtherScanExplorer, HttpSocialPlatform, MpcSigner,
};
use owes_core::config::ToggleStore;
use owes_core::ledger::BetLedger;
use owes_core::processors::{Orchestrator, StageDeps};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Owes - social betting escrow bot
#[derive(Parser, Debug)]
#[command(name = "owes-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./owes-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting owes-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Secrets come from the environment, never the config file
    let secrets = Secrets::from_env().map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;

    // Capability adapters
    let toggles = ToggleStore::new(loaded.toggles);
    let signer = Arc::new(MpcSigner::new(
        loaded.endpoints.signer.clone(),
        loaded.orchestrator.identity.signer_account.clone(),
    ));
    let deps = StageDeps {
        // Seed the search floors just before boot so a restarted process
        // does not replay posts it already handled.
        ledger: Arc::new(BetLedger::seeded(
            loaded.orchestrator.timing.search_backfill,
        )),
        social: Arc::new(HttpSocialPlatform::new(
            loaded.endpoints.social.clone(),
            secrets.social_bearer,
            toggles.clone(),
        )),
        oracle: Arc::new(AgentOracle::new(
            loaded.endpoints.oracle.clone(),
            secrets.oracle_auth,
            loaded.endpoints.parser_agent.clone(),
            loaded.endpoints.resolver_agent.clone(),
        )),
        explorer: Arc::new(EtherScanExplorer::new(secrets.etherscan_api_key)),
        wallet: signer.clone(),
        registry: signer.clone(),
        archive: signer,
        toggles: toggles.clone(),
        config: loaded.orchestrator,
    };

    let orchestrator = Arc::new(Orchestrator::new(deps));
    if loaded.autostart {
        orchestrator.start().await;
    } else {
        tracing::info!("Autostart disabled, waiting for POST /api/start");
    }

    // Create application state
    let state = AppState::new(orchestrator.clone(), toggles, loaded.admin_secret_hash);

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", loaded.listen);
    let result = run_server(router, loaded.listen).await;

    // Signal the config reload handler to stop
    shutdown_notify.notify_one();

    // Drain the stage tasks before exiting
    orchestrator.shutdown().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
