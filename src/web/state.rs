use std::sync::Arc;

use tokio::sync::RwLock;

use crate::database::Database;
use crate::risk::RiskGatekeeper;
use crate::types::SystemConfig;

/// Shared state handed to every `axum` handler. Read-mostly: the two control
/// endpoints are the only writers, and every write round-trips through
/// `system_config` so a restart doesn't silently re-arm a stopped engine.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub gatekeeper: Arc<RiskGatekeeper>,
    pub system: Arc<RwLock<SystemConfig>>,
}

impl AppState {
    pub fn new(db: Arc<Database>, gatekeeper: Arc<RiskGatekeeper>, system: Arc<RwLock<SystemConfig>>) -> Self {
        Self { db, gatekeeper, system }
    }
}
