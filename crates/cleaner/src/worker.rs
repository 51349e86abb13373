//! The Cleaner: periodically deletes expired collections (any terminal or
//! still-collecting-but-ancient row past the retention window) from the
//! relational store, then best-effort deletes their archives from the
//! Object Store (§4.6).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use collector_core::CLEANUP_LOCK_KEY;
use collector_executor::Tick;
use collector_store_object::delete_objects;
use collector_store_pg::{CleanerRepo, Locker};
use object_store::ObjectStore;
use sqlx::PgPool;
use tracing::info;

use crate::error::CleanerError;

pub struct Cleaner {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    prefix: String,
    retention: chrono::Duration,
}

impl Cleaner {
    pub fn new(pool: PgPool, store: Arc<dyn ObjectStore>, prefix: String, retention: chrono::Duration) -> Self {
        Self { pool, store, prefix, retention }
    }

    pub async fn tick_once(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - self.retention;
        let expired = CleanerRepo::discover_expired(&self.pool, cutoff).await?;
        if expired.is_empty() {
            return Ok(());
        }

        let pool = self.pool.clone();
        let store = self.store.clone();
        let prefix = self.prefix.clone();
        let ran: Option<()> = Locker::try_lock_func(&self.pool, CLEANUP_LOCK_KEY, move || {
            clean_locked(pool, store, prefix, expired)
        })
        .await?;

        if ran.is_none() {
            info!("cleaner tick: lock held elsewhere, skipping");
        }
        Ok(())
    }
}

async fn clean_locked(
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
    prefix: String,
    expired: Vec<collector_core::CollectionId>,
) -> Result<(), CleanerError> {
    let deleted = CleanerRepo::clean_database(&pool, &expired).await?;
    info!(
        requested = expired.len(),
        deleted = deleted.len(),
        "cleaner: database rows removed (skipped rows are held by a finalizer)"
    );

    let result_ids: Vec<String> = deleted.into_iter().filter_map(|d| d.result_id).collect();
    if !result_ids.is_empty() {
        delete_objects(store.as_ref(), &prefix, &result_ids).await?;
    }
    Ok(())
}

#[async_trait]
impl Tick for Cleaner {
    async fn tick(&self) -> anyhow::Result<()> {
        self.tick_once().await
    }

    fn name(&self) -> &str {
        "cleaner"
    }
}
