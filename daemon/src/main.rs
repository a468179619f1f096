//! # cilo-daemon
//!
//! Entry point for the workstation tunnel daemon (§4.6): reads the
//! persisted config written by the CLI that provisioned this workstation,
//! brings the tunnel up, then serves the control socket until `"stop"` is
//! received or the process is signalled.

use cilo_daemon::daemon::Daemon;
use cilo_daemon::persist::PersistDir;
use cilo_daemon::socket;
use cilo_daemon::tunnel::WgQuickInterface;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cilo_daemon=info".into()),
        )
        .init();

    let root = std::env::var("CILO_TUNNEL_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| PersistDir::default_root());
    let persist = PersistDir::new(root);
    let config = persist.read_config()?;

    let tunnel: Arc<dyn cilo_daemon::tunnel::TunnelInterface> = Arc::new(WgQuickInterface::new());
    let daemon = Arc::new(Daemon::new(persist.clone(), tunnel, config));

    daemon.start().await?;
    info!(environment_id = daemon.environment_id(), "tunnel up");

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.cancel();
    });

    socket::serve(&persist.socket_path(), daemon.clone(), shutdown).await?;

    daemon.stop().await?;
    info!("tunnel down");

    Ok(())
}

async fn wait_for_signal() {
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
    tracing::info!("shutdown signal received");
}
