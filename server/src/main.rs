//! # cilo-server
//!
//! Control-plane entry point: loads configuration, connects and migrates
//! the store, wires the pool/provisioner/allocator/agent client together,
//! spawns the background reconcilers, and serves the HTTP API.

use cilo_server::agent_client::AgentClient;
use cilo_server::allocator::OverlayAllocator;
use cilo_server::api;
use cilo_server::config::Settings;
use cilo_server::pool::Pool;
use cilo_server::provisioner::{NullCloudProvider, Provisioner};
use cilo_server::reconcile::PeerReconciler;
use cilo_server::state::AppState;
use cilo_server::store::Store;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Server entry point.
///
/// Initializes logging, connects the store, wires the pool and its
/// reconcilers, and starts listening on the configured address.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with env-filter support.
    // Default log level is `info` for the cilo_server crate.
    // Override with the `RUST_LOG` environment variable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cilo_server=info,tower_http=info".into()),
        )
        .init();

    let settings = Settings::load()?;

    let store = Store::connect(&settings.database_url).await?;
    store.migrate().await?;
    info!("connected to postgres and ran migrations");

    let provisioner = Provisioner::new(
        Arc::new(NullCloudProvider),
        settings.ssh_key_path.clone(),
        settings.agent_binary_url.clone(),
    );
    let pool = Arc::new(Pool::new(store.clone(), provisioner.clone(), &settings));
    let allocator = OverlayAllocator::new(store.clone());
    let agent_client = AgentClient::new();

    let pool_reconcile_token = pool.clone().spawn_reconciler(settings.pool_reconcile_interval_s);
    let peer_reconciler = Arc::new(PeerReconciler::new(store.clone(), agent_client.clone()));
    let peer_reconcile_token = peer_reconciler.spawn(settings.peer_sync_interval_s);

    let state = AppState {
        store,
        pool,
        provisioner: Arc::new(provisioner),
        allocator,
        agent_client,
        started_at: Instant::now(),
    };

    let app = api::router(state);

    let addr: std::net::SocketAddr = settings.listen_addr.parse()?;
    info!("cilo-server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool_reconcile_token.cancel();
    peer_reconcile_token.cancel();

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
    info!("shutdown signal received, draining connections");
}
