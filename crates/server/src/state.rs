//! Shared application state handed to every Axum handler.

use std::sync::Arc;

use collector_cache::ActiveSetCache;
use collector_core::Config;
use object_store::ObjectStore;
use sqlx::PgPool;

pub struct AppState {
    pub pool: PgPool,
    pub cache: Arc<ActiveSetCache>,
    pub object_store: Arc<dyn ObjectStore>,
    pub object_prefix: String,
    pub config: Config,
}
