use collector_core::CollectorError;

/// Errors surfaced by the relational store, before conversion into the
/// shared [`CollectorError`] kind at the public API boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorePgError {
    #[error("collection {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("malformed criteria json: {0}")]
    Criteria(#[from] serde_json::Error),
}

impl From<StorePgError> for CollectorError {
    fn from(e: StorePgError) -> Self {
        match e {
            StorePgError::NotFound(id) => CollectorError::NotFound(id),
            StorePgError::Database(sqlx::Error::RowNotFound) => CollectorError::NotFound(0),
            other => CollectorError::Internal(other.to_string()),
        }
    }
}
