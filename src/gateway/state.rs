use std::sync::Arc;

use crate::admin::AdminService;
use crate::auth::TokenVerifier;
use crate::db::Database;
use crate::engine::{CatchUpCalculator, ContractEngine};
use crate::settlement::SettlementService;
use crate::websocket::ConnectionManager;

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ContractEngine>,
    pub catch_up: Arc<CatchUpCalculator>,
    pub settlement: Arc<SettlementService>,
    pub admin: Arc<AdminService>,
    /// WebSocket connection registry
    pub ws_manager: Arc<ConnectionManager>,
    pub tokens: TokenVerifier,
    /// Present only with the PostgreSQL backend
    pub pg_db: Option<Arc<Database>>,
}
