//! Configuration types and loading logic.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use migration_tracing::TracingConfig;
use serde::{Deserialize, Deserializer};

use crate::broker::retry::RetryPolicy;

/// Plain environment variables honored without a prefix.
const PLAIN_ENV_KEYS: &[&str] = &["kafka_brokers", "port"];

/// Top-level relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Bootstrap brokers. Accepts a list or a comma-separated string.
    #[serde(default = "default_brokers", deserialize_with = "broker_list")]
    pub kafka_brokers: Vec<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub kafka: KafkaConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,

    #[serde(default)]
    pub tracing: TracingConfig,
}

/// Startup connection retry.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

/// Kafka client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Upper bound on each step of a single connect attempt.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Partition count for topics created on connect.
    #[serde(default = "default_partitions")]
    pub topic_partitions: i32,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,

    /// Long-poll wait of the diagnostic consumer's fetches.
    #[serde(default = "default_fetch_max_wait_ms")]
    pub fetch_max_wait_ms: i32,

    #[serde(default = "default_consumer_buffer")]
    pub consumer_buffer: usize,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            topic_partitions: default_partitions(),
            replication_factor: default_replication_factor(),
            fetch_max_wait_ms: default_fetch_max_wait_ms(),
            consumer_buffer: default_consumer_buffer(),
        }
    }
}

/// Diagnostic consumer that logs every record on the relay's topics.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_max_attempts() -> u32 {
    10
}

fn default_delay_ms() -> u64 {
    2_000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_partitions() -> i32 {
    1
}

fn default_replication_factor() -> i16 {
    1
}

fn default_fetch_max_wait_ms() -> i32 {
    500
}

fn default_consumer_buffer() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn broker_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    let entries = match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };
    let brokers: Vec<String> = entries
        .iter()
        .map(|b| b.trim())
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect();

    Ok(if brokers.is_empty() {
        default_brokers()
    } else {
        brokers
    })
}

impl RelayConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Prefixed environment variables (EVENTS_RELAY_ prefix, __ for nesting)
    /// 2. Plain environment variables (KAFKA_BROKERS, PORT)
    /// 3. TOML config file
    /// 4. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: RelayConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::raw().only(PLAIN_ENV_KEYS))
            .merge(Env::prefixed("EVENTS_RELAY_").split("__"))
            .extract()?;

        Ok(config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
