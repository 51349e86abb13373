//! Relational Store: the `collections`/`requests`/`request_collections`
//! schema and the repositories that operate on it.

mod cleaner_repo;
mod collection_repo;
mod criteria;
mod error;
mod locker;
mod request_repo;
mod result_repo;

pub use cleaner_repo::{CleanerRepo, DeletedCollection};
pub use collection_repo::CollectionRepo;
pub use error::StorePgError;
pub use locker::Locker;
pub use request_repo::RequestRepo;
pub use result_repo::ResultRepo;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Opens a connection pool and brings the schema up to date. Call once at
/// startup; every repository in this crate takes a `&PgPool` directly, so
/// there is no further state to thread through.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StorePgError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}
