//! Transaction-scoped advisory locking.
//!
//! `pg_try_advisory_xact_lock` is non-blocking and automatically released
//! at transaction end (commit or rollback), so a crashed holder can never
//! leave the lock stuck — this is what lets the Finalizer and Cleaner run
//! from multiple instances without a separate lock-expiry mechanism.

use collector_core::LockKey;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::StorePgError;

pub struct Locker;

impl Locker {
    /// Runs `f` inside a new transaction only if `key` is acquired;
    /// otherwise returns `Ok(None)` without running `f`. The transaction
    /// commits if `f` returns `Ok`, rolls back if it returns `Err`.
    ///
    /// `E` is generic (rather than pinned to [`StorePgError`]) so callers
    /// in other crates — the Finalizer holds its per-collection lock
    /// across an object-store upload, the Cleaner across an object-store
    /// delete — can run work that fails with their own error type without
    /// a throwaway wrapper enum. Any `sqlx::Error` encountered acquiring or
    /// releasing the lock itself still converts via `?`.
    pub async fn try_lock_with_tx<T, E, F, Fut>(pool: &PgPool, key: LockKey, f: F) -> Result<Option<T>, E>
    where
        E: From<sqlx::Error>,
        F: FnOnce(&mut Transaction<'_, Postgres>) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut tx = pool.begin().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;
        if !acquired {
            tx.rollback().await?;
            return Ok(None);
        }

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(Some(value))
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Convenience wrapper matching §4.1's `TryLockFunc`: runs `f` with no
    /// access to the transaction at all when `key` is acquired, otherwise
    /// returns `Ok(false)` without running `f`.
    pub async fn try_lock_func<T, E, F, Fut>(pool: &PgPool, key: LockKey, f: F) -> Result<Option<T>, E>
    where
        E: From<sqlx::Error>,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        Self::try_lock_with_tx(pool, key, |_tx| f()).await
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn lock_key_type_is_i64() {
        let _k: collector_core::LockKey = collector_core::CLEANUP_LOCK_KEY;
    }
}
