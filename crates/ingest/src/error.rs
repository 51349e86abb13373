use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("bus connection error: {0}")]
    Connection(String),

    #[error("message decode error: {0}")]
    Decode(String),

    #[error("acknowledge error: {0}")]
    Ack(String),
}
