//! Lazy, backpressured streaming of a collection's stored request bodies,
//! used by the Finalizer to assemble an archive without holding every
//! request for a collection in memory at once.

use collector_core::{CollectionId, RequestChunk};
use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::error::StorePgError;

const STREAM_CHANNEL_CAPACITY: usize = 8;
const DEFAULT_PAGE_SIZE: i64 = 200;

pub struct ResultRepo;

impl ResultRepo {
    /// Streams the raw `body` bytes of every request linked to
    /// `collection_id`, oldest first, paging through the table so the
    /// database never has to materialize the whole result set at once. The
    /// receiver yields one `RequestChunk` per request; an `Err` chunk is
    /// always the last one sent. At most `limit` chunks are emitted, per
    /// §4.1 — the Finalizer passes `requestCountLimit` here, which is also
    /// the upper bound `requestCount` itself can never exceed. `page_size`
    /// is the internal paging width (the configured
    /// `finalizerResultBatchSize`); non-positive values fall back to the
    /// built-in default.
    pub fn stream_request_bodies(
        pool: PgPool,
        collection_id: CollectionId,
        limit: i64,
        page_size: i64,
    ) -> mpsc::Receiver<RequestChunk> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let page_size = if page_size > 0 { page_size } else { DEFAULT_PAGE_SIZE };
        tokio::spawn(async move {
            let mut after_id: i64 = 0;
            let mut emitted: i64 = 0;
            'outer: loop {
                if emitted >= limit {
                    return;
                }
                let page_size = page_size.min(limit - emitted);
                let page = sqlx::query_as::<_, (i64, Vec<u8>)>(
                    r#"
                    SELECT r.id, r.body
                    FROM requests r
                    JOIN request_collections rc ON rc.request_id = r.id
                    WHERE rc.collection_id = $1 AND r.id > $2
                    ORDER BY r.id ASC
                    LIMIT $3
                    "#,
                )
                .bind(collection_id)
                .bind(after_id)
                .bind(page_size)
                .fetch_all(&pool)
                .await;

                let page = match page {
                    Ok(p) => p,
                    Err(e) => {
                        let _ = tx.send(Err(StorePgError::from(e).into())).await;
                        return;
                    }
                };
                if page.is_empty() {
                    return;
                }
                for (id, body) in page {
                    after_id = id;
                    emitted += 1;
                    // A closed receiver means the consumer stopped early
                    // (cancellation or an earlier error) — stop producing.
                    if tx.send(Ok(body)).await.is_err() {
                        return;
                    }
                    if emitted >= limit {
                        break 'outer;
                    }
                }
            }
        });
        rx
    }

    pub async fn update_result_id(
        pool: &PgPool,
        collection_id: CollectionId,
        result_id: &str,
    ) -> Result<(), StorePgError> {
        let result = sqlx::query("UPDATE collections SET result_id = $2, updated_at = now() WHERE id = $1")
            .bind(collection_id)
            .bind(result_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorePgError::NotFound(collection_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn default_page_size_is_positive() {
        assert!(super::DEFAULT_PAGE_SIZE > 0);
    }
}
