//! # Control-Plane Shared State
//!
//! Cloned into every axum handler, mirroring the teacher's `AppState`
//! shape — a small bundle of `Clone`-cheap handles (an `sqlx::PgPool`
//! wrapper, an `Arc`-backed pool manager, and an HTTP client) rather than a
//! single god object with interior mutability throughout.

use crate::allocator::OverlayAllocator;
use crate::agent_client::AgentClient;
use crate::pool::Pool;
use crate::provisioner::Provisioner;
use crate::store::Store;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub pool: Arc<Pool>,
    pub provisioner: Arc<Provisioner>,
    pub allocator: OverlayAllocator,
    pub agent_client: AgentClient,
    pub started_at: Instant,
}

impl axum::extract::FromRef<AppState> for Store {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
