// ============================================================================
// Messaging - Order change notifications
// ============================================================================
//
// - redpanda.rs   - Kafka-compatible producer behind a circuit breaker
// - admin.rs      - broker readiness probe and topic bootstrap
// - dispatcher.rs - detached, time-bounded publish tasks
//
// ============================================================================

pub mod admin;
pub mod dispatcher;
pub mod redpanda;

use async_trait::async_trait;
use std::time::Duration;

pub use dispatcher::NotificationDispatcher;
pub use redpanda::RedpandaClient;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("circuit breaker open, broker unavailable")]
    CircuitOpen,

    #[error("kafka send error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publisher task failed: {0}")]
    Task(String),
}

impl PublishError {
    /// Outcome label used in metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            PublishError::CircuitOpen => "circuit_open",
            PublishError::Timeout(_) => "timeout",
            _ => "failure",
        }
    }
}

/// Outbound channel for serialized order events.
#[async_trait]
pub trait OrderPublisher: Send + Sync {
    /// Send one message keyed by `key`.
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Flush anything still buffered. Called once on shutdown.
    async fn close(&self) -> Result<(), PublishError>;

    /// Whether the publisher currently accepts messages.
    async fn is_available(&self) -> bool {
        true
    }
}
