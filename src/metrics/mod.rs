// Private module declaration
mod server;

use prometheus::{
    Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// Re-export for public API
pub use server::configure;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order writes and lookups (by where the answer came from)
// - Store latency and errors per operation
// - Cache size and warm-up duration
// - Notification publish outcomes and circuit breaker state
//
// Every Metrics value owns its own registry; nothing is registered globally.
// Scraped via GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Orders
    pub orders_created: IntCounter,
    pub order_lookups: IntCounterVec,

    // Store
    pub store_operation_duration: HistogramVec,
    pub store_errors: IntCounterVec,

    // Cache
    pub cache_size: IntGauge,
    pub cache_warm_up_seconds: Gauge,

    // Publishing
    pub publish_total: IntCounterVec,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders saved")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_lookups = IntCounterVec::new(
            Opts::new("order_lookups_total", "Order lookups by source"),
            &["source"],
        )?;
        registry.register(Box::new(order_lookups.clone()))?;

        let store_operation_duration = HistogramVec::new(
            HistogramOpts::new("store_operation_duration_seconds", "Store call duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(store_operation_duration.clone()))?;

        let store_errors = IntCounterVec::new(
            Opts::new("store_errors_total", "Store calls that failed"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(store_errors.clone()))?;

        let cache_size = IntGauge::new("order_cache_size", "Orders currently cached")?;
        registry.register(Box::new(cache_size.clone()))?;

        let cache_warm_up_seconds = Gauge::new(
            "order_cache_warm_up_seconds",
            "Duration of the last cache warm-up",
        )?;
        registry.register(Box::new(cache_warm_up_seconds.clone()))?;

        let publish_total = IntCounterVec::new(
            Opts::new("order_notifications_total", "Order notification publish outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(publish_total.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_lookups,
            store_operation_duration,
            store_errors,
            cache_size,
            cache_warm_up_seconds,
            publish_total,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_lookup(&self, source: &str) {
        self.order_lookups.with_label_values(&[source]).inc();
    }

    pub fn record_store_call(&self, operation: &str, duration_secs: f64, error_kind: Option<&str>) {
        self.store_operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
        if let Some(kind) = error_kind {
            self.store_errors.with_label_values(&[operation, kind]).inc();
        }
    }

    pub fn record_publish(&self, outcome: &str) {
        self.publish_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.set(size as i64);
    }

    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }

    #[cfg(test)]
    pub fn publish_count(&self, outcome: &str) -> u64 {
        self.publish_total.with_label_values(&[outcome]).get()
    }

    #[cfg(test)]
    pub fn lookup_count(&self, source: &str) -> u64 {
        self.order_lookups.with_label_values(&[source]).get()
    }
}
