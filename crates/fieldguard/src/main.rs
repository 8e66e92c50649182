//! `fieldguard` admin server entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP export).
//! 3. Seed the registry, validate the setup, load the key, and self-test;
//!    then discard the encoded key.
//! 4. Build the Axum router and serve the admin API.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use fieldguard::server::{router, state::AppState};
use fieldguard::{telemetry, Config, FieldGuard};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let mut cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "fieldguard starting"
    );

    // -----------------------------------------------------------------------
    // 3. Field encryption layer
    // -----------------------------------------------------------------------
    let guard = Arc::new(FieldGuard::from_config(&cfg)?);
    cfg.discard_key();

    // -----------------------------------------------------------------------
    // 4. HTTP server
    // -----------------------------------------------------------------------
    let router = router::build(AppState::new(guard));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
