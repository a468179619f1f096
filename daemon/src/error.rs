//! Daemon error taxonomy (spec §7's shape, applied to the workstation
//! side): tunnel-backend failures and persistence failures are the only
//! two classes this binary has to report — there is no HTTP caller to
//! shape a response for, so this is a plain `thiserror` enum surfaced
//! through `main()`'s `anyhow::Result`.

use crate::tunnel::TunnelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error("failed to persist daemon state: {0}")]
    Persist(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
