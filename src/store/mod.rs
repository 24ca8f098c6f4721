// ============================================================================
// Durable Store - Order Repository
// ============================================================================
//
// The store is the source of truth for order aggregates. The cache and the
// notification path only ever hold copies of what was committed here.
//
// ============================================================================

pub mod postgres;

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::order::Order;

pub use postgres::PgOrderRepository;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),

    #[error("{operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{operation}: timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Short label for metrics.
    pub fn operation(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "find order by id",
            StoreError::Database { operation, .. } | StoreError::Timeout { operation, .. } => *operation,
        }
    }

    /// Operation and kind only, without the driver's message. Safe to hand
    /// to clients; the full error goes to the log.
    pub fn summary(&self) -> String {
        format!("{} failed ({})", self.operation(), self.kind())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::Database { .. } => "database",
            StoreError::Timeout { .. } => "timeout",
        }
    }
}

/// Persistence contract consumed by the cache warm-up and the order service.
///
/// Implementations must be safe to share across request handlers.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Atomically upsert the header, delivery and payment and replace all items.
    async fn save(&self, order: &Order) -> StoreResult<()>;

    /// Load one complete aggregate. Returns [`StoreError::NotFound`] when no
    /// header row matches.
    async fn find_by_id(&self, order_uid: &str) -> StoreResult<Order>;

    /// Load every complete aggregate. An empty store yields an empty vector.
    async fn find_all(&self) -> StoreResult<Vec<Order>>;

    /// Cheap reachability probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// Bound a store call by `limit`, turning an elapsed deadline into
/// [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(operation: &'static str, limit: Duration, call: F) -> StoreResult<T>
where
    F: std::future::Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            elapsed: limit,
        }),
    }
}
