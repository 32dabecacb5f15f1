//! Verdikta external adapter server
//!
//! Long-running HTTP service consumed by a Chainlink oracle node.
//!
//! ## Usage
//!
//! ```bash
//! AI_NODE_URL=http://localhost:3000 \
//! IPFS_PINNING_SERVICE=https://pin.example/api/upload \
//! IPFS_PINNING_KEY=... \
//! cargo run --bin adapter_server
//!
//! curl -X POST http://localhost:8080/ \
//!   -H "Content-Type: application/json" \
//!   -d '{"id":"job-1","data":{"cid":"bafy...","mode":0}}'
//!
//! curl http://localhost:8080/health
//! ```

use std::net::SocketAddr;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use verdikta_adapter::{create_adapter_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set the environment directly
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("configuration: {e}"))?;
    let _log_guard = init_tracing(&config);

    info!(config = %config.redacted_summary(), "starting verdikta adapter");

    let state = AppState::with_http_jury(config.clone())
        .map_err(|e| anyhow::anyhow!("startup wiring: {e}"))?;
    let sweeper = state.cache.spawn_sweeper();

    let app = create_adapter_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "adapter listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("adapter stopped");
    Ok(())
}

fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "adapter.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "shutdown signal listener failed");
    }
    info!("shutdown signal received");
}
