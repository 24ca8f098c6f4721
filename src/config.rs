use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::messaging::redpanda::MAX_SEND_TIME;

/// Service configuration, read once at startup.
///
/// # Environment
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | APP_HOST | 0.0.0.0 | HTTP bind address |
/// | APP_PORT | 8081 | HTTP port |
/// | DB_HOST | postgres | Postgres host |
/// | DB_PORT | 5432 | Postgres port |
/// | DB_USER | orders_user | Postgres role |
/// | DB_PASSWORD | orders_password | Postgres password |
/// | DB_NAME | orders_db | Database name |
/// | DB_MAX_CONNECTIONS | 10 | Pool size |
/// | DB_ACQUIRE_TIMEOUT_MS | 5000 | Wait for a pooled connection |
/// | STORE_TIMEOUT_MS | 5000 | Deadline for each store call made by a request |
/// | KAFKA_ENABLED | true | Publish order notifications |
/// | KAFKA_BROKERS | kafka:9092 | Comma separated bootstrap servers |
/// | KAFKA_TOPIC | orders | Notification topic |
/// | KAFKA_TOPIC_PARTITIONS | 3 | Partitions when the topic is created |
/// | KAFKA_REPLICATION_FACTOR | 1 | Replication when the topic is created |
/// | KAFKA_STARTUP_TIMEOUT_MS | 30000 | How long to wait for the broker at startup |
/// | PUBLISH_TIMEOUT_MS | 10000 | Deadline for one background publish, above 6000 |
/// | SHUTDOWN_TIMEOUT_MS | 10000 | Grace period for draining on shutdown |
///
/// A `.env` file in the working directory is loaded first if present.
/// Unset variables take the default; set but unparseable ones are an error.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    /// Per-call store deadline on the request path
    pub store_timeout: Duration,
    /// Grace period for in-flight requests and notifications
    pub shutdown_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

// Password stays out of logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub enabled: bool,
    pub brokers: Vec<String>,
    pub topic: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub startup_timeout: Duration,
    pub publish_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brokers: vec!["kafka:9092".to_string()],
            topic: "orders".to_string(),
            partitions: 3,
            replication_factor: 1,
            startup_timeout: Duration::from_secs(30),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load from the process environment (and `.env`, if any).
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database = DatabaseConfig {
            host: env.string("DB_HOST", "postgres"),
            port: env.parse("DB_PORT", 5432)?,
            user: env.string("DB_USER", "orders_user"),
            password: env.string("DB_PASSWORD", "orders_password"),
            name: env.string("DB_NAME", "orders_db"),
            max_connections: env.parse("DB_MAX_CONNECTIONS", 10)?,
            acquire_timeout: env.millis("DB_ACQUIRE_TIMEOUT_MS", 5_000)?,
        };

        for (key, value) in [
            ("DB_HOST", &database.host),
            ("DB_USER", &database.user),
            ("DB_PASSWORD", &database.password),
            ("DB_NAME", &database.name),
        ] {
            if value.trim().is_empty() {
                bail!("{} must not be empty", key);
            }
        }
        if database.max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be at least 1");
        }

        let brokers: Vec<String> = env
            .string("KAFKA_BROKERS", "kafka:9092")
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect();

        let kafka = KafkaConfig {
            enabled: env.parse("KAFKA_ENABLED", true)?,
            brokers,
            topic: env.string("KAFKA_TOPIC", "orders"),
            partitions: env.parse("KAFKA_TOPIC_PARTITIONS", 3)?,
            replication_factor: env.parse("KAFKA_REPLICATION_FACTOR", 1)?,
            startup_timeout: env.millis("KAFKA_STARTUP_TIMEOUT_MS", 30_000)?,
            publish_timeout: env.millis("PUBLISH_TIMEOUT_MS", 10_000)?,
        };

        if kafka.enabled {
            if kafka.publish_timeout <= MAX_SEND_TIME {
                bail!(
                    "PUBLISH_TIMEOUT_MS must be greater than {} (producer send time)",
                    MAX_SEND_TIME.as_millis()
                );
            }
            if kafka.brokers.is_empty() {
                bail!("KAFKA_BROKERS must list at least one broker when KAFKA_ENABLED=true");
            }
            if kafka.topic.trim().is_empty() {
                bail!("KAFKA_TOPIC must not be empty when KAFKA_ENABLED=true");
            }
        }

        Ok(Self {
            http: HttpConfig {
                host: env.string("APP_HOST", "0.0.0.0"),
                port: env.parse("APP_PORT", 8081)?,
            },
            database,
            kafka,
            store_timeout: env.millis("STORE_TIMEOUT_MS", 5_000)?,
            shutdown_timeout: env.millis("SHUTDOWN_TIMEOUT_MS", 10_000)?,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str, default: &str) -> String {
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match (self.lookup)(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str, default: u64) -> Result<Duration> {
        self.parse(key, default).map(Duration::from_millis)
    }
}
