use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::aggregate::Order;
use super::errors::ValidationError;
use crate::cache::{OrderCache, WarmUpError};
use crate::health::{HealthReport, HealthStatus};
use crate::messaging::NotificationDispatcher;
use crate::metrics::Metrics;
use crate::store::{with_deadline, OrderRepository, StoreError, StoreResult};

// ============================================================================
// Order Service
// ============================================================================
//
// Ties the store, the cache and the notification dispatcher together.
//
// Writes go to the store first; only a committed order reaches the cache,
// and only then is a notification scheduled. Reads try the cache and fall
// back to the store, populating the cache on the way out.
//
// ============================================================================

/// Upper bound for the health probe's store ping.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    cache: Arc<OrderCache>,
    dispatcher: Arc<NotificationDispatcher>,
    metrics: Arc<Metrics>,
    store_timeout: Duration,
    cache_loaded: AtomicBool,
}

impl OrderService {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        cache: Arc<OrderCache>,
        dispatcher: Arc<NotificationDispatcher>,
        metrics: Arc<Metrics>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            cache,
            dispatcher,
            metrics,
            store_timeout,
            cache_loaded: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Load every stored order into the cache.
    pub async fn warm_up_cache(&self) -> Result<usize, WarmUpError> {
        let start = Instant::now();
        let loaded = self.cache.warm_up(self.repository.as_ref()).await?;

        self.metrics
            .cache_warm_up_seconds
            .set(start.elapsed().as_secs_f64());
        self.metrics.set_cache_size(self.cache.len());
        self.cache_loaded.store(true, Ordering::SeqCst);

        Ok(loaded)
    }

    /// Validate, persist, cache, then notify. Returns the order's uid.
    ///
    /// A store failure leaves the cache untouched and publishes nothing.
    pub async fn create_order(&self, mut order: Order) -> Result<String, OrderServiceError> {
        order.validate()?;
        order.truncate_timestamps();

        self.timed("save", self.repository.save(&order)).await?;

        let order_uid = order.order_uid.clone();
        let order = Arc::new(order);
        self.cache.set(order_uid.clone(), order.clone());
        self.metrics.set_cache_size(self.cache.len());
        self.metrics.orders_created.inc();

        self.dispatcher.dispatch(order);

        tracing::info!(order_uid = %order_uid, "Order created");
        Ok(order_uid)
    }

    /// Cache first, then the store. `Ok(None)` when the order doesn't exist.
    pub async fn get_order(&self, order_uid: &str) -> Result<Option<Arc<Order>>, OrderServiceError> {
        if let Some(order) = self.cache.get(order_uid) {
            tracing::debug!(order_uid = %order_uid, "Cache hit");
            self.metrics.record_lookup("cache");
            return Ok(Some(order));
        }

        tracing::debug!(order_uid = %order_uid, "Cache miss, reading from store");

        match self
            .timed("find_by_id", self.repository.find_by_id(order_uid))
            .await
        {
            Ok(order) => {
                let order = Arc::new(order);
                self.cache.set(order_uid, order.clone());
                self.metrics.set_cache_size(self.cache.len());
                self.metrics.record_lookup("store");
                Ok(Some(order))
            }
            Err(e) if e.is_not_found() => {
                self.metrics.record_lookup("not_found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Everything in the cache, newest first. An empty cache falls back to a
    /// full store scan, whose result is cached and returned as loaded.
    pub async fn list_orders(&self) -> Result<Vec<Arc<Order>>, OrderServiceError> {
        let mut orders = self.cache.get_all();
        if !orders.is_empty() {
            orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
            return Ok(orders);
        }

        tracing::debug!("Cache empty, listing orders from store");

        let loaded: Vec<Arc<Order>> = self
            .timed("find_all", self.repository.find_all())
            .await?
            .into_iter()
            .map(Arc::new)
            .collect();

        for order in loaded.iter().filter(|o| !o.order_uid.is_empty()) {
            self.cache.set(order.order_uid.clone(), order.clone());
        }
        self.metrics.set_cache_size(self.cache.len());

        Ok(loaded)
    }

    pub async fn health_check(&self) -> HealthReport {
        let ping = with_deadline("ping", HEALTH_CHECK_TIMEOUT, self.repository.ping()).await;
        let store_error = ping.err().map(|e| {
            tracing::warn!(error = %e, "Health check: store unreachable");
            e.summary()
        });

        let publisher_available = self.dispatcher.publisher_available().await;
        let store_reachable = store_error.is_none();
        let status = HealthStatus::evaluate(store_error, publisher_available);

        HealthReport {
            error: status.reason().map(String::from),
            status,
            cache_size: self.cache.len(),
            cache_loaded: self.cache_loaded.load(Ordering::SeqCst),
            store_reachable,
            publisher_available,
            checked_at: Utc::now(),
        }
    }

    /// Run a store call under the request deadline, recording its latency
    /// and any failure other than not-found.
    async fn timed<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        let start = Instant::now();
        let result = with_deadline(operation, self.store_timeout, call).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Err(e) if !e.is_not_found() => {
                tracing::error!(operation, error = %e, "Store call failed");
                self.metrics.record_store_call(operation, elapsed, Some(e.kind()));
            }
            _ => self.metrics.record_store_call(operation, elapsed, None),
        }

        result
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
