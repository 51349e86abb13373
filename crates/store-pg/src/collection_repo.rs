//! CRUD operations for the `collections` table.
//!
//! A stateless unit struct with async methods taking a `&PgPool`, matching
//! the rest of the workspace's repository style.

use collector_core::{Collection, CollectionFilter, CollectionId, CollectionStatus, Task};
use sqlx::PgPool;

use crate::criteria::{encode_criteria, CollectionRow};
use crate::error::StorePgError;

pub struct CollectionRepo;

impl CollectionRepo {
    pub async fn create_collection(pool: &PgPool, task: &Task) -> Result<Collection, StorePgError> {
        let criteria = encode_criteria(task)?;
        let row = sqlx::query_as::<_, CollectionRow>(
            r#"
            INSERT INTO collections
                (status, handler, criteria, request_count_limit, request_duration_limit_secs)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, status, handler, criteria, request_count_limit,
                      request_duration_limit_secs, request_count, created_at,
                      started_at, updated_at, completed_at, result_id, error_message, error_code
            "#,
        )
        .bind(CollectionStatus::Pending.to_i16())
        .bind(&task.message_selection.handler)
        .bind(criteria)
        .bind(task.completion.request_count_limit)
        .bind(task.completion.time_limit.num_seconds())
        .fetch_one(pool)
        .await?;
        row.into_collection()
    }

    /// Fetch one collection. When `for_update` is set, the row is locked
    /// with `FOR UPDATE` — callers must already be inside a transaction.
    pub async fn get_collection(
        pool: &PgPool,
        id: CollectionId,
        for_update: bool,
    ) -> Result<Collection, StorePgError> {
        let sql = if for_update {
            r#"
            SELECT id, status, handler, criteria, request_count_limit,
                   request_duration_limit_secs, request_count, created_at,
                   started_at, updated_at, completed_at, result_id, error_message, error_code
            FROM collections WHERE id = $1 FOR UPDATE
            "#
        } else {
            r#"
            SELECT id, status, handler, criteria, request_count_limit,
                   request_duration_limit_secs, request_count, created_at,
                   started_at, updated_at, completed_at, result_id, error_message, error_code
            FROM collections WHERE id = $1
            "#
        };
        let row = sqlx::query_as::<_, CollectionRow>(sql)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(StorePgError::NotFound(id))?;
        row.into_collection()
    }

    pub async fn get_collections(
        pool: &PgPool,
        filter: &CollectionFilter,
    ) -> Result<Vec<Collection>, StorePgError> {
        let statuses: Vec<i16> = filter.statuses.iter().map(|s| s.to_i16()).collect();
        let rows = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT id, status, handler, criteria, request_count_limit,
                   request_duration_limit_secs, request_count, created_at,
                   started_at, updated_at, completed_at, result_id, error_message, error_code
            FROM collections
            WHERE ($1::smallint[] IS NULL OR cardinality($1::smallint[]) = 0 OR status = ANY($1))
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(&statuses)
        .bind(filter.created_at_from)
        .bind(filter.created_at_to)
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(CollectionRow::into_collection).collect()
    }

    /// Updates status and the fields that naturally accompany a status
    /// transition (`started_at` on first match, `completed_at`/`result_id`/
    /// error fields on terminal transitions). Returns `NotFound` if no row
    /// matched — the caller asked to transition a collection that doesn't
    /// exist.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_status(
        pool: &PgPool,
        id: CollectionId,
        status: CollectionStatus,
        result_id: Option<&str>,
        error_message: Option<&str>,
        error_code: Option<&str>,
    ) -> Result<(), StorePgError> {
        let result = sqlx::query(
            r#"
            UPDATE collections
            SET status = $2,
                updated_at = now(),
                completed_at = CASE WHEN $2 = ANY($3::smallint[]) THEN now() ELSE completed_at END,
                result_id = COALESCE($4, result_id),
                error_message = COALESCE($5, error_message),
                error_code = COALESCE($6, error_code)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_i16())
        .bind(
            [
                CollectionStatus::Completed.to_i16(),
                CollectionStatus::Failed.to_i16(),
                CollectionStatus::Cancelled.to_i16(),
            ]
            .to_vec(),
        )
        .bind(result_id)
        .bind(error_message)
        .bind(error_code)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorePgError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_set_includes_all_three() {
        let terminal = [
            CollectionStatus::Completed.to_i16(),
            CollectionStatus::Failed.to_i16(),
            CollectionStatus::Cancelled.to_i16(),
        ];
        assert_eq!(terminal.len(), 3);
        assert!(terminal.contains(&CollectionStatus::Cancelled.to_i16()));
    }
}
