//! Transactional batch write of matched requests: inserts the raw payloads,
//! links them to the collections that matched, and bumps each collection's
//! running `request_count`.
//!
//! Two deliberate departures from the upstream implementation this was
//! ported from: collections are updated in ascending-id order (rather than
//! whatever order a map iterates in) to give concurrent batches a
//! consistent lock-acquisition order and avoid deadlocks, and the
//! `request_count` UPDATE carries an explicit `status = ANY(collecting)`
//! guard so a batch racing a Finalizer tick can never bump the count of a
//! collection that has already left the collecting state.

use std::collections::BTreeMap;

use collector_core::{CollectionStatus, MatchResult, RequestContent};
use sqlx::PgPool;

use crate::error::StorePgError;

pub struct RequestRepo;

impl RequestRepo {
    /// Stores `requests` and, for each, the collections it matched
    /// (`matches[i]` corresponds to `requests[i]`). No-op if `requests` is
    /// empty.
    pub async fn store_batch(
        pool: &PgPool,
        requests: &[RequestContent],
        matches: &[MatchResult],
    ) -> Result<(), StorePgError> {
        if requests.is_empty() {
            return Ok(());
        }
        debug_assert_eq!(requests.len(), matches.len());

        let mut tx = pool.begin().await?;

        let mut request_ids = Vec::with_capacity(requests.len());
        for req in requests {
            let headers = serde_json::to_value(&req.headers)?;
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO requests (handler, headers, body, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(&req.handler)
            .bind(headers)
            .bind(&req.body)
            .bind(req.created_at)
            .fetch_one(&mut *tx)
            .await?;
            request_ids.push(id);
        }

        // Aggregate match counts per collection, in ascending collection-id
        // order, so every batch acquires row locks in the same order.
        let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
        for m in matches {
            for &cid in &m.collection_ids {
                *counts.entry(cid).or_insert(0) += 1;
            }
        }
        for (collection_id, count) in &counts {
            let collecting: Vec<i16> = CollectionStatus::collecting()
                .iter()
                .map(|s| s.to_i16())
                .collect();
            sqlx::query(
                r#"
                UPDATE collections
                SET request_count = LEAST(request_count + $2, request_count_limit),
                    status = CASE
                        WHEN request_count + $2 >= request_count_limit
                            THEN $4::smallint
                        ELSE $5::smallint
                    END,
                    started_at = COALESCE(started_at, now()),
                    updated_at = now()
                WHERE id = $1 AND status = ANY($3::smallint[])
                "#,
            )
            .bind(collection_id)
            .bind(*count as i32)
            .bind(&collecting)
            .bind(CollectionStatus::Finalizing.to_i16())
            .bind(CollectionStatus::InProgress.to_i16())
            .execute(&mut *tx)
            .await?;
        }

        for (req_id, m) in request_ids.iter().zip(matches.iter()) {
            for &cid in &m.collection_ids {
                sqlx::query(
                    "INSERT INTO request_collections (request_id, collection_id) VALUES ($1, $2)",
                )
                .bind(req_id)
                .bind(cid)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn req(handler: &str) -> RequestContent {
        RequestContent {
            handler: handler.into(),
            headers: HashMap::new(),
            body: b"{}".to_vec(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn aggregates_match_counts_in_ascending_collection_order() {
        let matches = vec![
            MatchResult { request_pos: 0, collection_ids: vec![3, 1] },
            MatchResult { request_pos: 1, collection_ids: vec![1, 2] },
        ];
        let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
        for m in &matches {
            for &cid in &m.collection_ids {
                *counts.entry(cid).or_insert(0) += 1;
            }
        }
        let ordered: Vec<i64> = counts.keys().copied().collect();
        assert_eq!(ordered, vec![1, 2, 3]);
        assert_eq!(counts[&1], 2);
    }

    #[test]
    fn empty_batch_is_trivially_valid() {
        let requests: Vec<RequestContent> = vec![];
        let matches: Vec<MatchResult> = vec![];
        assert_eq!(requests.len(), matches.len());
        let _ = req("x");
    }
}
