//! Pledgy API entry point.
//!
//! Hosts the goal ledger behind an Axum REST API. Ledger events are
//! persisted to SQLite by a background writer, and settlement requests are
//! recorded in an outbox and forwarded to the value-transfer service.

mod api;
mod config;
mod db;
mod errors;
mod events;
mod oracle;
mod settlement;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use pledgy_ledger::{Ed25519PermitVerifier, EventDispatcher, Ledger, SharedLedger};
use reqwest::Client;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use events::ChannelSink;
use oracle::AttestationOracle;
use settlement::{ChannelSettlement, SettlementState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client for the settlement endpoint.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    // ─── Ledger ───────────────────────────────────────────
    let verifier = Arc::new(Ed25519PermitVerifier::from_hex(&config.permit_issuer_key)?);
    let oracle = Arc::new(AttestationOracle::new());
    let ledger = Ledger::new(config.ledger.clone(), verifier, oracle.clone());
    let epoch = chrono::Utc::now().timestamp_millis();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (settlement_tx, settlement_rx) = mpsc::unbounded_channel();
    let mut dispatcher = EventDispatcher::new();
    dispatcher.add_sink(Box::new(ChannelSink::new(event_tx)));
    let shared = Arc::new(SharedLedger::new(
        ledger,
        dispatcher,
        Arc::new(ChannelSettlement::new(settlement_tx)),
    ));

    // ─── Background tasks ─────────────────────────────────
    tokio::spawn(events::run_writer(pool.clone(), epoch, event_rx));
    let settlement_state = Arc::new(SettlementState {
        pool: pool.clone(),
        client,
        url: config.settlement_url.clone(),
    });
    tokio::spawn(settlement::run(settlement_state, settlement_rx));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        ledger: shared,
        oracle,
        oracle_id: config.oracle_id.clone(),
        attestation_timeout: config.attestation_timeout,
        pool,
        epoch,
        clock: Arc::new(api::SystemClock),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/goals", get(api::list_goals).post(api::create_goal))
        .route("/goals/:id", get(api::get_goal))
        .route("/goals/:id/stakes", get(api::get_stakes))
        .route("/goals/:id/claims", get(api::get_claims))
        .route("/goals/:id/deposits", post(api::deposit))
        .route("/goals/:id/attestation", post(api::attest))
        .route("/goals/:id/resolve", post(api::resolve))
        .route("/goals/:id/claimable", get(api::claimable))
        .route("/goals/:id/claim", post(api::claim))
        .route("/goals/:id/close", post(api::close))
        .route("/goals/:id/events", get(api::get_goal_events))
        .route("/events", get(api::get_all_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}, oracle: {}", config.oracle_id);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
