//! In-memory broker for tests: scripted connect failures, recorded
//! publishes, and subscriptions fed from the same log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Broker, BrokerError, ConsumedEvent, EventPublisher};

#[derive(Default)]
struct Log {
    published: Vec<(String, Vec<u8>)>,
    offsets: HashMap<String, i64>,
    subscribers: Vec<(Vec<String>, mpsc::Sender<ConsumedEvent>)>,
}

/// Fails the first `fail_first` connect attempts, then behaves.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    fail_first: u32,
    reject_publish: bool,
    attempts: Arc<AtomicU32>,
    subscribed: Arc<Mutex<Vec<String>>>,
    log: Arc<Mutex<Log>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            fail_first,
            ..Self::default()
        }
    }

    pub fn rejecting_publishes() -> Self {
        Self {
            reject_publish: true,
            ..Self::default()
        }
    }

    /// Connect attempts seen so far (producer connects).
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.log.lock().unwrap().published.clone()
    }
}

struct MemoryPublisher {
    topics: Vec<String>,
    reject: bool,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Option<i64>, BrokerError> {
        if !self.topics.iter().any(|t| t == topic) {
            return Err(BrokerError::UnknownTopic(topic.to_string()));
        }
        if self.reject {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                message: "not enough replicas".to_string(),
            });
        }

        let (offset, receivers) = {
            let mut log = self.log.lock().unwrap();
            let next = log.offsets.entry(topic.to_string()).or_insert(0);
            let offset = *next;
            *next += 1;
            log.published.push((topic.to_string(), payload.clone()));
            let receivers: Vec<_> = log
                .subscribers
                .iter()
                .filter(|(topics, _)| topics.iter().any(|t| t == topic))
                .map(|(_, tx)| tx.clone())
                .collect();
            (offset, receivers)
        };

        for tx in receivers {
            let _ = tx
                .send(ConsumedEvent {
                    topic: topic.to_string(),
                    offset,
                    payload: payload.clone(),
                })
                .await;
        }
        Ok(Some(offset))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect_producer(
        &self,
        topics: &[&'static str],
    ) -> Result<Arc<dyn EventPublisher>, BrokerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(BrokerError::Connect(format!(
                "connection refused (attempt {attempt})"
            )));
        }
        Ok(Arc::new(MemoryPublisher {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            reject: self.reject_publish,
            log: self.log.clone(),
        }))
    }

    async fn subscribe(
        &self,
        topics: &[&'static str],
    ) -> Result<mpsc::Receiver<ConsumedEvent>, BrokerError> {
        let topics: Vec<String> = topics.iter().map(|t| t.to_string()).collect();
        self.subscribed.lock().unwrap().extend(topics.iter().cloned());

        let (tx, rx) = mpsc::channel(64);
        let mut log = self.log.lock().unwrap();
        // Replay retained history first, as a from-earliest subscription would.
        let mut offsets: HashMap<&str, i64> = HashMap::new();
        for (topic, payload) in &log.published {
            let offset = offsets.entry(topic.as_str()).or_insert(0);
            if topics.contains(topic) {
                let _ = tx.try_send(ConsumedEvent {
                    topic: topic.clone(),
                    offset: *offset,
                    payload: payload.clone(),
                });
            }
            *offset += 1;
        }
        log.subscribers.push((topics, tx));
        Ok(rx)
    }
}
