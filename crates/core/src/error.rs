use thiserror::Error;

/// Error kinds surfaced across the collection engine's component
/// boundaries. Storage- and transport-specific crates define their own
/// error enums and convert into one of these kinds at the service
/// boundary, matching the layering of the wider workspace's per-crate
/// error types.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("collection {0} not found")]
    NotFound(crate::entity::CollectionId),

    #[error("invalid status for this operation: {0}")]
    InvalidStatus(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reserved: raised when an archive's `result.json` cannot be parsed.
    /// Not currently raised by any call site — the original implementation
    /// this was ported from defines it but never triggers it either.
    #[error("invalid archive content: {0}")]
    InvalidArchiveContent(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transient or internal error: {0}")]
    Internal(String),
}

impl CollectorError {
    /// HTTP status code the Task API Surface maps this error kind to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidStatus(_) => 409,
            Self::InvalidArgument(_) => 400,
            _ => 500,
        }
    }

    /// Whether this error kind should suppress logging at leaf sites
    /// (normal shutdown path, matching the spec's cancellation policy).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Internal(msg) if msg == "cancelled")
    }
}
