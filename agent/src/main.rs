//! # cilo-agent
//!
//! Entry point for the long-running on-machine service: loads settings,
//! wires the tunnel backend and stack runner, and serves the HTTP API
//! (§4.5).

use cilo_agent::api;
use cilo_agent::config::Settings;
use cilo_agent::stack::ComposeStackRunner;
use cilo_agent::state::AppState;
use cilo_agent::tunnel::WgQuickBackend;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cilo_agent=info,tower_http=info".into()),
        )
        .init();

    let settings = Settings::load()?;

    let state = AppState {
        tunnel: Arc::new(WgQuickBackend::new(settings.interface.clone())),
        stack: Arc::new(ComposeStackRunner::new(settings.workspace_root.clone())),
        settings: Arc::new(settings.clone()),
    };

    let app = api::router(state);

    let addr: std::net::SocketAddr = settings.listen_addr.parse()?;
    info!("cilo-agent listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
