//! HTTP surface of the X algorithm simulator.

pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};

use algo_sim::{SimulatorConfig, XaiProvider};

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;

/// Initialize tracing so `tracing::info!` and friends produce output.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

pub async fn serve(config: SimulatorConfig) -> Result<()> {
    let provider = Arc::new(XaiProvider::new(&config.provider).context("building xAI client")?);
    let state = AppState::from_config(provider, &config);
    let app = build_router(state, &config.server.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    tracing::info!(
        addr = %config.server.bind_addr,
        origins = ?config.server.allowed_origins,
        "X Algorithm Simulator API listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;
    Ok(())
}
