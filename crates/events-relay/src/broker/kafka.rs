//! Kafka backend built on `rskafka`.
//!
//! Every topic is produced to and consumed from partition 0. Missing topics
//! are created on connect so a fresh cluster works without manual setup.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use rskafka::client::consumer::{StartOffset, StreamConsumer, StreamConsumerBuilder};
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::{Broker, BrokerError, ConsumedEvent, EventPublisher};
use crate::config::KafkaConfig;

const PARTITION: i32 = 0;

/// Connects to a Kafka cluster given its bootstrap brokers.
pub struct KafkaBroker {
    brokers: Vec<String>,
    config: KafkaConfig,
}

impl KafkaBroker {
    pub fn new(brokers: Vec<String>, config: KafkaConfig) -> Self {
        Self { brokers, config }
    }

    /// Bound one connect step so an unreachable cluster fails the attempt
    /// instead of stalling the retry loop.
    async fn bounded<T, E, F>(&self, step: &str, fut: F) -> Result<T, BrokerError>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BrokerError::Connect(format!("{step}: {e}"))),
            Err(_) => Err(BrokerError::Connect(format!(
                "{step}: timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn client(&self) -> Result<Client, BrokerError> {
        self.bounded(
            "bootstrap",
            ClientBuilder::new(self.brokers.clone()).build(),
        )
        .await
    }

    async fn ensure_topics(&self, client: &Client, topics: &[&'static str]) -> Result<(), BrokerError> {
        let existing: HashSet<String> = self
            .bounded("list topics", client.list_topics())
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();

        let missing: Vec<&str> = topics
            .iter()
            .copied()
            .filter(|t| !existing.contains(*t))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let controller = client
            .controller_client()
            .map_err(|e| BrokerError::Connect(format!("controller: {e}")))?;
        for topic in missing {
            tracing::info!(
                topic,
                partitions = self.config.topic_partitions,
                replication_factor = self.config.replication_factor,
                "Creating missing topic"
            );
            self.bounded(
                "create topic",
                controller.create_topic(
                    topic,
                    self.config.topic_partitions,
                    self.config.replication_factor,
                    5_000,
                ),
            )
            .await?;
        }
        Ok(())
    }

    async fn partition(&self, client: &Client, topic: &str) -> Result<PartitionClient, BrokerError> {
        self.bounded(
            "partition client",
            client.partition_client(topic.to_string(), PARTITION, UnknownTopicHandling::Retry),
        )
        .await
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn connect_producer(
        &self,
        topics: &[&'static str],
    ) -> Result<Arc<dyn EventPublisher>, BrokerError> {
        let client = self.client().await?;
        self.ensure_topics(&client, topics).await?;

        let mut partitions = HashMap::with_capacity(topics.len());
        for topic in topics {
            partitions.insert(topic.to_string(), self.partition(&client, topic).await?);
        }
        tracing::debug!(topics = ?topics, "Kafka producer connected");
        Ok(Arc::new(KafkaPublisher { partitions }))
    }

    async fn subscribe(
        &self,
        topics: &[&'static str],
    ) -> Result<mpsc::Receiver<ConsumedEvent>, BrokerError> {
        let client = self.client().await?;
        self.ensure_topics(&client, topics).await?;

        let mut consumers = Vec::with_capacity(topics.len());
        for topic in topics {
            let partition = self.partition(&client, topic).await.map_err(|e| {
                BrokerError::Subscribe {
                    topic: topic.to_string(),
                    message: e.to_string(),
                }
            })?;
            let consumer = StreamConsumerBuilder::new(Arc::new(partition), StartOffset::Earliest)
                .with_max_wait_ms(self.config.fetch_max_wait_ms)
                .build();
            consumers.push((*topic, consumer));
        }

        // Spawn only once every subscription succeeded, so a failed attempt
        // leaves no stray readers behind.
        let (tx, rx) = mpsc::channel(self.config.consumer_buffer);
        for (topic, consumer) in consumers {
            tokio::spawn(pump(topic, consumer, tx.clone()));
        }
        Ok(rx)
    }
}

/// Forward one topic's records into the shared channel until the receiver
/// goes away or the stream ends.
async fn pump(topic: &'static str, mut consumer: StreamConsumer, tx: mpsc::Sender<ConsumedEvent>) {
    while let Some(next) = consumer.next().await {
        match next {
            Ok((record_and_offset, _high_watermark)) => {
                let event = ConsumedEvent {
                    topic: topic.to_string(),
                    offset: record_and_offset.offset,
                    payload: record_and_offset.record.value.unwrap_or_default(),
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(topic, error = %e, "Kafka consumer error");
            }
        }
    }
    tracing::info!(topic, "Kafka consumer stream ended");
}

/// Producer holding one partition client per topic.
struct KafkaPublisher {
    partitions: HashMap<String, PartitionClient>,
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Option<i64>, BrokerError> {
        let partition = self
            .partitions
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;

        let span = migration_tracing::publish_span!(topic, payload.len());
        let start = Instant::now();

        async {
            let record = Record {
                key: None,
                value: Some(payload),
                headers: BTreeMap::new(),
                timestamp: chrono::Utc::now(),
            };

            let offsets = partition
                .produce(vec![record], Compression::NoCompression)
                .await
                .map_err(|e| BrokerError::Publish {
                    topic: topic.to_string(),
                    message: e.to_string(),
                })?;

            let offset = offsets.first().copied();
            tracing::Span::current().record("latency_ms", start.elapsed().as_millis() as u64);
            if let Some(offset) = offset {
                tracing::Span::current().record("offset", offset);
            }
            Ok(offset)
        }
        .instrument(span)
        .await
    }
}
