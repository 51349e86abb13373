//! Active-Set Cache: a write-behind, read-only snapshot of `pending` and
//! `in_progress` collections consulted by the Ingest Matcher's hot path so
//! it never hits the relational store per message.
//!
//! On a failed refresh the previous snapshot is kept rather than cleared —
//! a transient database hiccup should degrade to "matching against
//! slightly stale data", never to "matching against nothing".

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use collector_core::{Collection, CollectionFilter, CollectionId, CollectionStatus};
use collector_executor::Tick;
use sqlx::PgPool;
use tracing::warn;

pub struct ActiveSetCache {
    pool: PgPool,
    snapshot: RwLock<Arc<HashMap<CollectionId, Collection>>>,
}

impl ActiveSetCache {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self {
            pool,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        })
    }

    /// Current snapshot. Cheap: an `Arc` clone, not a copy of the map.
    pub fn snapshot(&self) -> Arc<HashMap<CollectionId, Collection>> {
        self.snapshot.read().expect("cache lock poisoned").clone()
    }

    pub async fn refresh(&self) -> anyhow::Result<()> {
        let filter = CollectionFilter {
            statuses: CollectionStatus::collecting().to_vec(),
            ..Default::default()
        };
        let rows = collector_store_pg::CollectionRepo::get_collections(&self.pool, &filter).await?;
        self.apply_snapshot(rows);
        Ok(())
    }

    fn apply_snapshot(&self, rows: Vec<Collection>) {
        let map: HashMap<CollectionId, Collection> = rows.into_iter().map(|c| (c.id, c)).collect();
        *self.snapshot.write().expect("cache lock poisoned") = Arc::new(map);
    }
}

#[async_trait]
impl Tick for ActiveSetCache {
    async fn tick(&self) -> anyhow::Result<()> {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "active-set cache refresh failed, keeping stale snapshot");
            return Err(e);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "active_set_cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::{CompletionCriteria, MessageSelectionCriteria, Task};
    use chrono::Utc;

    fn sample(id: CollectionId, status: CollectionStatus) -> Collection {
        Collection {
            id,
            task: Task {
                message_selection: MessageSelectionCriteria { handler: "h".into(), header_criteria: vec![] },
                completion: CompletionCriteria { time_limit: chrono::Duration::hours(1), request_count_limit: 10 },
            },
            status,
            request_count: 0,
            created_at: Utc::now(),
            started_at: None,
            updated_at: None,
            completed_at: None,
            result_id: None,
            error_message: None,
            error_code: None,
        }
    }

    fn cache_without_pool() -> ActiveSetCache {
        // A pool is never dialed in these tests since we exercise
        // `apply_snapshot` directly rather than `refresh`.
        ActiveSetCache {
            pool: PgPool::connect_lazy("postgres://unused/unused").expect("lazy pool"),
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    #[test]
    fn snapshot_starts_empty() {
        let cache = cache_without_pool();
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn apply_snapshot_replaces_contents() {
        let cache = cache_without_pool();
        cache.apply_snapshot(vec![sample(1, CollectionStatus::Pending)]);
        assert_eq!(cache.snapshot().len(), 1);
        cache.apply_snapshot(vec![
            sample(2, CollectionStatus::InProgress),
            sample(3, CollectionStatus::InProgress),
        ]);
        let snap = cache.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(!snap.contains_key(&1));
        assert!(snap.contains_key(&2) && snap.contains_key(&3));
    }
}
