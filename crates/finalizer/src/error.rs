use thiserror::Error;

/// Per-collection finalization failure. Aggregated across a tick rather
/// than propagated individually — a single collection's trouble must
/// never poison its siblings (§4.5).
#[derive(Debug, Error)]
pub enum FinalizerError {
    #[error(transparent)]
    Store(#[from] collector_store_pg::StorePgError),

    #[error(transparent)]
    ObjectStore(#[from] collector_store_object::StoreObjectError),
}

impl From<sqlx::Error> for FinalizerError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(collector_store_pg::StorePgError::from(e))
    }
}
