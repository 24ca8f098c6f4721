use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::order::Order;
use crate::store::{OrderRepository, StoreError};

/// Upper bound for the full-scan store call made during warm-up.
pub const WARM_UP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum WarmUpError {
    #[error("cache warm-up failed: {0}")]
    Store(#[from] StoreError),

    #[error("cache warm-up timed out after {0:?}")]
    Timeout(Duration),
}

/// Order cache keyed by `order_uid`.
///
/// One map behind a reader/writer lock: lookups and snapshots share the lock,
/// every mutation takes it exclusively. The lock is never held across an
/// `.await`, so a slow store call cannot stall readers.
#[derive(Default)]
pub struct OrderCache {
    entries: RwLock<HashMap<String, Arc<Order>>>,
}

impl std::fmt::Debug for OrderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCache")
            .field("len", &self.len())
            .finish()
    }
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `order_uid`.
    pub fn set(&self, order_uid: impl Into<String>, order: Arc<Order>) {
        self.entries.write().insert(order_uid.into(), order);
    }

    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.entries.read().get(order_uid).cloned()
    }

    /// Snapshot of every cached order, in no particular order.
    pub fn get_all(&self) -> Vec<Arc<Order>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn delete(&self, order_uid: &str) {
        self.entries.write().remove(order_uid);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Swap in a fresh, empty map.
    pub fn clear(&self) {
        *self.entries.write() = HashMap::new();
    }

    /// Populate the cache from the store at startup, bounded by
    /// [`WARM_UP_TIMEOUT`]. Returns the number of cached orders.
    pub async fn warm_up<R>(&self, repository: &R) -> Result<usize, WarmUpError>
    where
        R: OrderRepository + ?Sized,
    {
        self.warm_up_within(repository, WARM_UP_TIMEOUT).await
    }

    /// Same as [`OrderCache::warm_up`] with an explicit deadline.
    ///
    /// The store is read first, without holding the lock. Only once the full
    /// result is in hand is the map replaced, under a single write lock. On
    /// any failure the current contents are left as they were.
    pub async fn warm_up_within<R>(
        &self,
        repository: &R,
        limit: Duration,
    ) -> Result<usize, WarmUpError>
    where
        R: OrderRepository + ?Sized,
    {
        let start = Instant::now();

        let orders = tokio::time::timeout(limit, repository.find_all())
            .await
            .map_err(|_| WarmUpError::Timeout(limit))??;

        let fetched = orders.len();
        let loaded = self.replace_all(orders);

        tracing::info!(
            fetched = fetched,
            loaded = loaded,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cache warm-up completed"
        );

        Ok(loaded)
    }

    fn replace_all(&self, orders: Vec<Order>) -> usize {
        let mut fresh = HashMap::with_capacity(orders.len());
        for order in orders {
            if order.order_uid.is_empty() {
                tracing::warn!("Skipping order without order_uid during warm-up");
                continue;
            }
            fresh.insert(order.order_uid.clone(), Arc::new(order));
        }

        let loaded = fresh.len();
        let mut entries = self.entries.write();
        entries.clear();
        entries.extend(fresh);
        loaded
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
