//! Shared handler state.

use std::sync::Arc;

use ember_core::config::RelayConfig;
use tokio_util::sync::CancellationToken;

use crate::auth::JwtManager;
use crate::storage::AppDatabase;
use crate::upstream::Upstream;

/// Handles built once in `main` and cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub db: AppDatabase,
    pub jwt: Arc<JwtManager>,
    pub upstream: Arc<dyn Upstream>,
    pub relay: RelayConfig,
    /// Parent of every relay session token; cancelled on server shutdown.
    pub shutdown: CancellationToken,
}
