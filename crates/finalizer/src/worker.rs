//! The Finalizer: discovers collections due for completion, streams their
//! payloads into an archive, and transitions them to `completed` —
//! exactly once per collection, even under concurrently running
//! instances, via the per-collection advisory lock (§4.5, §4.7).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use collector_core::{Collection, CollectionFilter, CollectionId, CollectionStatus};
use collector_executor::Tick;
use collector_store_object::save_result_stream;
use collector_store_pg::{CollectionRepo, Locker, ResultRepo, StorePgError};
use futures::stream::{self, StreamExt};
use object_store::ObjectStore;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::error::FinalizerError;

/// What happened to one collection during a tick, for aggregation.
enum Outcome {
    /// This worker finalized the collection (or found it already terminal
    /// and did nothing further).
    Completed,
    /// Another holder had the advisory lock; skipped entirely.
    LockHeldElsewhere,
}

pub struct Finalizer {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    prefix: String,
    write_chunk_size_bytes: usize,
    result_batch_size: i64,
    max_collections: usize,
    concurrency: usize,
}

impl Finalizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        store: Arc<dyn ObjectStore>,
        prefix: String,
        write_chunk_size_bytes: usize,
        result_batch_size: usize,
        max_collections: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            pool,
            store,
            prefix,
            write_chunk_size_bytes,
            result_batch_size: result_batch_size as i64,
            max_collections,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn tick_once(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let filter = CollectionFilter { statuses: CollectionStatus::active().to_vec(), ..Default::default() };
        let candidates = CollectionRepo::get_collections(&self.pool, &filter).await?;

        let due: Vec<Collection> = candidates
            .into_iter()
            .filter(|c| c.is_due_for_finalization(now))
            .take(self.max_collections)
            .collect();

        if due.is_empty() {
            return Ok(());
        }
        info!(count = due.len(), "finalizer tick: collections due");

        let concurrency = self.concurrency;
        let results: Vec<Result<Outcome, FinalizerError>> = stream::iter(due)
            .map(|c| self.process_one(c))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let total = results.len();
        let mut failed = 0usize;
        for result in &results {
            if let Err(e) = result {
                failed += 1;
                error!(error = %e, "finalizer: collection failed");
            }
        }

        if failed > 0 {
            if failed == total {
                anyhow::bail!("finalizer tick: all {failed} collection(s) failed");
            }
            warn!(failed, total, "finalizer tick: partial failure, continuing");
        }
        Ok(())
    }

    async fn process_one(&self, collection: Collection) -> Result<Outcome, FinalizerError> {
        let id = collection.id;
        let pool = self.pool.clone();
        let store = self.store.clone();
        let prefix = self.prefix.clone();
        let write_chunk_size_bytes = self.write_chunk_size_bytes;
        let result_batch_size = self.result_batch_size;

        let held: Option<()> = Locker::try_lock_with_tx(&self.pool, id, move |_tx| {
            finalize_locked(pool, store, prefix, id, write_chunk_size_bytes, result_batch_size)
        })
        .await?;

        match held {
            Some(()) => Ok(Outcome::Completed),
            None => Ok(Outcome::LockHeldElsewhere),
        }
    }
}

/// Runs strictly inside the per-collection advisory lock. A separate pool
/// connection (not the lock-holding transaction) handles the reads and
/// writes here — only the lock itself needs to live on that transaction;
/// per §4.5's documented alternative, per-collection mutual exclusion is
/// preserved by the lock regardless of which connection does the work.
async fn finalize_locked(
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    prefix: String,
    id: CollectionId,
    write_chunk_size_bytes: usize,
    result_batch_size: i64,
) -> Result<(), FinalizerError> {
    let current = CollectionRepo::get_collection(&pool, id, false).await?;
    if current.status.is_terminal() {
        return Ok(());
    }

    // Idempotent promotion: the Ingest Matcher flips in_progress -> finalizing
    // on the count-based path; this covers the time-elapsed path the
    // Finalizer itself is responsible for detecting, including a `pending`
    // collection that timed out without ever receiving a matching write.
    if current.status.is_collecting() {
        CollectionRepo::update_status(&pool, id, CollectionStatus::Finalizing, None, None, None).await?;
    }

    if current.request_count > 0 {
        let limit = current.task.completion.request_count_limit as i64;
        let rx = ResultRepo::stream_request_bodies(pool.clone(), id, limit, result_batch_size);
        let result_id = save_result_stream(store.as_ref(), &prefix, id, rx, write_chunk_size_bytes).await?;
        ResultRepo::update_result_id(&pool, id, &result_id).await?;
    }

    match CollectionRepo::update_status(&pool, id, CollectionStatus::Completed, None, None, None).await {
        Ok(()) => Ok(()),
        // Another instance already terminated this collection between our
        // read and this write — treat as success (§4.5).
        Err(StorePgError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Tick for Finalizer {
    async fn tick(&self) -> anyhow::Result<()> {
        self.tick_once().await
    }

    fn name(&self) -> &str {
        "finalizer"
    }
}
