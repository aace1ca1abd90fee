//! offer-claim-gateway server entry point.
//!
//! Starts the Axum HTTP server over the in-memory or PostgreSQL backend.

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use offer_claim_gateway::api;
use offer_claim_gateway::app_state::AppState;
use offer_claim_gateway::config::{GatewayConfig, LogFormat};
use offer_claim_gateway::domain::{RandomCodeGenerator, SystemClock};
use offer_claim_gateway::store::event_log::EventRecorder;
use offer_claim_gateway::store::postgres::PgStore;
use offer_claim_gateway::store::{ClaimLedger, OfferRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config =
        GatewayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!(
        addr = %config.listen_addr,
        persistence = config.persistence_enabled,
        "starting offer-claim-gateway"
    );

    // Build storage and service layers
    let app_state = if config.persistence_enabled {
        let store = PgStore::connect(&config)
            .await
            .context("failed to connect to PostgreSQL")?;
        store.migrate().await.context("failed to run migrations")?;

        let store = Arc::new(store);
        let state = AppState::new(
            Arc::clone(&store) as Arc<dyn OfferRegistry>,
            Arc::clone(&store) as Arc<dyn ClaimLedger>,
            Arc::new(SystemClock),
            Arc::new(RandomCodeGenerator),
            &config,
        );
        if config.event_log_enabled {
            let _ = EventRecorder::new(store.pool().clone()).spawn(&state.event_bus);
            tracing::info!("claim event log enabled");
        }
        state
    } else {
        tracing::warn!("persistence disabled, using in-memory store");
        AppState::in_memory(&config)
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
