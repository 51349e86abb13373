use collector_core::CollectorError;

#[derive(Debug, thiserror::Error)]
pub enum StoreObjectError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("archive packaging error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upstream error while streaming request bodies: {0}")]
    Upstream(#[from] CollectorError),

    #[error("archive not found: {0}")]
    NotFound(String),
}

impl From<StoreObjectError> for CollectorError {
    fn from(e: StoreObjectError) -> Self {
        match e {
            StoreObjectError::NotFound(_) => CollectorError::Internal(e.to_string()),
            StoreObjectError::Upstream(inner) => inner,
            other => CollectorError::Internal(other.to_string()),
        }
    }
}
