//! Ingest Matcher: consumes bus batches, matches each request against the
//! Active-Set Cache snapshot, and persists hits transactionally.

mod bus;
mod error;
mod matcher;
mod worker;

pub use bus::{decode_request, BusConsumer, BusMessage};
pub use error::IngestError;
pub use matcher::match_batch;
pub use worker::IngestWorker;
