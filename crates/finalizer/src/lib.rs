//! Finalizer: discovers collections due for completion and streams their
//! payloads into an archive under the per-collection advisory lock.

mod error;
mod worker;

pub use error::FinalizerError;
pub use worker::Finalizer;
