//! Relay binary entry point.
//!
//! Loads configuration from the environment, wires up the shared state,
//! spawns the recovery sweeper, and serves the gateway router until a
//! shutdown signal arrives.

use anyhow::Result;
use relay_config::GatewayConfig;
use relay_gateway::{AppState, router};
use relay_scheduler::{SWEEP_PERIOD, spawn_sweeper};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &GatewayConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_str()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        term.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = GatewayConfig::from_env()?;
    init_tracing(&config);

    let state = AppState::new(config);
    let sweeper = spawn_sweeper(Arc::clone(&state.scheduler), SWEEP_PERIOD);

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    Ok(())
}
