//! Retention-driven deletion of terminal collections and the requests that
//! become orphaned once they go.
//!
//! Delete order is links → collections → orphaned requests, per the
//! declared invariant that a request must never outlive every collection
//! that references it while also never blocking on a request row still
//! linked elsewhere.

use chrono::{DateTime, Utc};
use collector_core::CollectionId;
use sqlx::PgPool;

use crate::error::StorePgError;

const DISCOVER_BATCH_SIZE: i64 = 500;

/// One collection actually removed by [`CleanerRepo::clean_database`],
/// carrying the `resultId` the caller needs to also delete from the
/// Object Store (`None` if the collection never finalized, e.g. it was
/// cancelled with zero matches).
#[derive(Debug, Clone)]
pub struct DeletedCollection {
    pub id: CollectionId,
    pub result_id: Option<String>,
}

pub struct CleanerRepo;

impl CleanerRepo {
    /// Finds any-status collections created before `cutoff` (§4.6 step 1:
    /// a plain read, no locking — the lock-aware filtering happens in
    /// [`Self::clean_database`] instead).
    pub async fn discover_expired(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<CollectionId>, StorePgError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM collections
            WHERE created_at <= $1
            ORDER BY id ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(DISCOVER_BATCH_SIZE)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    /// Deletes the subset of `collection_ids` not currently held by a
    /// Finalizer's per-collection advisory lock, and every request that
    /// becomes unreferenced as a result.
    ///
    /// Rather than a `FOR UPDATE SKIP LOCKED` row scan — a separate lock
    /// system from the `pg_try_advisory_xact_lock` the Finalizer actually
    /// holds (§4.7), and one that would never observe it — this attempts
    /// the very same per-collection advisory lock (`key = CollectionId`)
    /// the Finalizer takes, one id at a time and non-blocking, inside this
    /// transaction. A collection mid-finalization fails to acquire and is
    /// simply excluded from this tick's subset; it is picked up again on a
    /// later tick once the Finalizer's transaction has released the lock.
    /// Ids are visited in ascending order for the same deadlock-avoidance
    /// reason `RequestRepo::store_batch` sorts before updating.
    pub async fn clean_database(
        pool: &PgPool,
        collection_ids: &[CollectionId],
    ) -> Result<Vec<DeletedCollection>, StorePgError> {
        if collection_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = pool.begin().await?;

        let mut sorted_ids = collection_ids.to_vec();
        sorted_ids.sort_unstable();

        let mut locked_ids = Vec::with_capacity(sorted_ids.len());
        for id in &sorted_ids {
            let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            if acquired {
                locked_ids.push(*id);
            }
        }

        if locked_ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let subset: Vec<(i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, result_id FROM collections
            WHERE id = ANY($1::bigint[])
            ORDER BY id ASC
            "#,
        )
        .bind(&locked_ids)
        .fetch_all(&mut *tx)
        .await?;

        if subset.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = subset.iter().map(|(id, _)| *id).collect();

        sqlx::query("DELETE FROM request_collections WHERE collection_id = ANY($1::bigint[])")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM collections WHERE id = ANY($1::bigint[])")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM requests r
            WHERE NOT EXISTS (
                SELECT 1 FROM request_collections rc WHERE rc.request_id = r.id
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(subset.into_iter().map(|(id, result_id)| DeletedCollection { id, result_id }).collect())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn discover_batch_size_is_positive() {
        assert!(super::DISCOVER_BATCH_SIZE > 0);
    }
}
