use anyhow::{bail, Context, Result};
use rdkafka::{
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
    producer::{FutureProducer, Producer},
    types::RDKafkaErrorCode,
    util::Timeout,
};
use std::time::{Duration, Instant};

use super::redpanda::client_config;
use crate::config::KafkaConfig;

// ============================================================================
// Broker bootstrap helpers (startup only)
// ============================================================================

const METADATA_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const CREATE_TOPIC_TIMEOUT: Duration = Duration::from_secs(10);

/// Block until a broker answers a metadata request or `timeout` elapses.
/// Returns the number of brokers in the cluster.
pub async fn wait_for_broker(config: &KafkaConfig, timeout: Duration) -> Result<usize> {
    let producer: FutureProducer = client_config(config)
        .create()
        .context("failed to create kafka client")?;

    let deadline = Instant::now() + timeout;

    loop {
        let probe = producer.clone();
        let result = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, Timeout::After(METADATA_TIMEOUT))
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .context("metadata probe panicked")?;

        match result {
            Ok(brokers) => {
                tracing::info!(brokers = brokers, "Kafka is available");
                return Ok(brokers);
            }
            Err(e) if Instant::now() >= deadline => {
                bail!("kafka not available after {:?}: {}", timeout, e);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Waiting for Kafka...");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

/// Create the notification topic unless it already exists.
pub async fn ensure_topic(config: &KafkaConfig) -> Result<()> {
    let admin: AdminClient<DefaultClientContext> = client_config(config)
        .create()
        .context("failed to create kafka admin client")?;

    let topic = NewTopic::new(
        &config.topic,
        config.partitions,
        TopicReplication::Fixed(config.replication_factor),
    );
    let options = AdminOptions::new().operation_timeout(Some(CREATE_TOPIC_TIMEOUT));

    let results = admin
        .create_topics([&topic], &options)
        .await
        .context("create topics request failed")?;

    for result in results {
        match result {
            Ok(name) => tracing::info!(topic = %name, "Topic created"),
            Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::info!(topic = %name, "Topic already exists")
            }
            Err((name, code)) => bail!("failed to create topic {}: {}", name, code),
        }
    }

    Ok(())
}
