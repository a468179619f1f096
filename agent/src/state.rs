//! Shared state handed to every axum handler, mirroring the shape
//! `cilo-server::state::AppState` uses on the control-plane side: a small
//! bundle of cheaply `Clone`-able, `Arc`-backed handles.

use crate::config::Settings;
use crate::stack::StackRunner;
use crate::tunnel::TunnelBackend;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub tunnel: Arc<dyn TunnelBackend>,
    pub stack: Arc<dyn StackRunner>,
}
