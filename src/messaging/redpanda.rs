use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    error::KafkaResult,
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use super::{OrderPublisher, PublishError};
use crate::config::KafkaConfig;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

/// How long librdkafka may hold a message (queueing + retries) before
/// reporting it as failed.
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `send` may wait for room in a full producer queue.
const QUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest a single send can take before librdkafka reports an outcome.
/// An outer publish deadline must exceed this, or the circuit breaker never
/// gets to count the failure.
pub const MAX_SEND_TIME: Duration = MESSAGE_TIMEOUT.saturating_add(QUEUE_TIMEOUT);

/// Flush budget on shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer settings shared by the publisher and the admin helpers.
pub fn client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.brokers.join(","))
        .set("message.timeout.ms", MESSAGE_TIMEOUT.as_millis().to_string())
        .set("acks", "1")
        .set("compression.type", "snappy")
        .set("linger.ms", "10")
        .set("batch.num.messages", "100");
    client
}

pub struct RedpandaClient {
    producer: FutureProducer,
    topic: String,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl RedpandaClient {
    pub fn new(config: &KafkaConfig) -> KafkaResult<Self> {
        let producer: FutureProducer = client_config(config).create()?;

        // Fail fast while the broker is down instead of queueing doomed sends.
        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            circuit_breaker: CircuitBreaker::new(cb_config),
            metrics: None,
        })
    }

    /// Report circuit breaker state changes to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn get_circuit_breaker_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    async fn report_circuit_state(&self) {
        if let Some(metrics) = &self.metrics {
            let state = self.circuit_breaker.get_state().await;
            metrics.update_circuit_breaker_state(state.as_gauge());
        }
    }
}

#[async_trait]
impl OrderPublisher for RedpandaClient {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&self.topic).key(key).payload(payload);

                self.producer
                    .send(record, Timeout::After(QUEUE_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e)
            })
            .await;

        self.report_circuit_state().await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    topic = %self.topic,
                    key = %key,
                    "Published to Redpanda"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    topic = %self.topic,
                    "Circuit breaker open - Redpanda unavailable"
                );
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    topic = %self.topic,
                    "Failed to publish to Redpanda"
                );
                Err(PublishError::Kafka(e))
            }
        }
    }

    async fn close(&self) -> Result<(), PublishError> {
        // flush blocks the calling thread until the queue drains.
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
            .await
            .map_err(|e| PublishError::Task(e.to_string()))??;

        tracing::info!(topic = %self.topic, "Producer flushed");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.circuit_breaker.get_state().await != CircuitState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kafka_config() -> KafkaConfig {
        KafkaConfig {
            brokers: vec!["127.0.0.1:9092".to_string(), "127.0.0.1:9093".to_string()],
            topic: "orders".to_string(),
            ..KafkaConfig::default()
        }
    }

    #[test]
    fn test_client_config_settings() {
        let config = client_config(&kafka_config());

        assert_eq!(
            config.get("bootstrap.servers"),
            Some("127.0.0.1:9092,127.0.0.1:9093")
        );
        assert_eq!(config.get("acks"), Some("1"));
        assert_eq!(config.get("compression.type"), Some("snappy"));
        assert_eq!(config.get("message.timeout.ms"), Some("5000"));
    }

    #[tokio::test]
    async fn test_new_client_starts_closed() {
        // Producer creation does not contact the broker.
        let client = RedpandaClient::new(&kafka_config()).unwrap();

        assert_eq!(client.topic(), "orders");
        assert_eq!(client.get_circuit_breaker_state().await, CircuitState::Closed);
        assert!(client.is_available().await);
    }
}
