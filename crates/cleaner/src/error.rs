use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanerError {
    #[error(transparent)]
    Store(#[from] collector_store_pg::StorePgError),

    #[error(transparent)]
    ObjectStore(#[from] collector_store_object::StoreObjectError),
}

impl From<sqlx::Error> for CleanerError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(collector_store_pg::StorePgError::from(e))
    }
}
