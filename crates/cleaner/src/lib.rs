//! Cleaner: retention-driven deletion of expired collections from the
//! relational and object stores, coexisting with concurrent finalization
//! via `SKIP LOCKED`.

mod error;
mod worker;

pub use error::CleanerError;
pub use worker::Cleaner;
