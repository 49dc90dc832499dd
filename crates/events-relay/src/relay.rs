//! The relay's shared broker handle.
//!
//! One [`Relay`] exists per process and is handed to request handlers
//! through axum state. It owns the connection state machine, the
//! initialize-once publisher, and the two readiness signals. Publishing
//! before the broker connection is up fails with
//! [`BrokerError::NotConnected`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;

use crate::broker::retry::{retry_constant, RetryPolicy};
use crate::broker::state::{BrokerState, ConnectionState};
use crate::broker::{Broker, BrokerError, ConsumedEvent, EventPublisher};
use crate::topics::{all_topics, EventCategory};

pub struct Relay {
    state: BrokerState,
    publisher: OnceLock<Arc<dyn EventPublisher>>,
    http_ready: AtomicBool,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            state: BrokerState::new(),
            publisher: OnceLock::new(),
            http_ready: AtomicBool::new(false),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn broker_ready(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    pub fn http_ready(&self) -> bool {
        self.http_ready.load(Ordering::Acquire)
    }

    pub fn mark_http_ready(&self) {
        self.http_ready.store(true, Ordering::Release);
    }

    /// Publish an already serialized payload to the category's topic.
    pub async fn publish(
        &self,
        category: EventCategory,
        payload: Vec<u8>,
    ) -> Result<Option<i64>, BrokerError> {
        let publisher = self.publisher.get().ok_or(BrokerError::NotConnected)?;
        publisher.publish(category.topic(), payload).await
    }

    /// Connect to the broker with bounded retry.
    ///
    /// One attempt connects the producer and, when `subscribe` is set,
    /// subscribes to every relay topic from the earliest record. On success
    /// the publisher is installed and the state becomes `Connected`; the
    /// subscription channel (if any) is returned for the diagnostic consumer.
    /// When every attempt fails the state becomes `Failed` and
    /// [`BrokerError::Exhausted`] is returned.
    pub async fn connect(
        &self,
        broker: &dyn Broker,
        policy: &RetryPolicy,
        subscribe: bool,
    ) -> Result<Option<mpsc::Receiver<ConsumedEvent>>, BrokerError> {
        self.state.transition(ConnectionState::Connecting);
        tracing::debug!(
            max_attempts = policy.max_attempts(),
            delay_ms = policy.delay().as_millis() as u64,
            subscribe,
            "Connecting to Kafka"
        );
        let topics = all_topics();
        let topic_list: &[&'static str] = &topics;

        let attempt = move |_: u32| async move {
            let publisher = broker.connect_producer(topic_list).await?;
            let events = if subscribe {
                Some(broker.subscribe(topic_list).await?)
            } else {
                None
            };
            Ok::<_, BrokerError>((publisher, events))
        };

        match retry_constant(policy, "Kafka connection", attempt).await {
            Ok(((publisher, events), attempt)) => {
                if self.publisher.set(publisher).is_err() {
                    tracing::warn!("Broker publisher was already installed");
                }
                self.state.transition(ConnectionState::Connected);
                tracing::info!(
                    attempt,
                    topics = ?topics,
                    http_ready = self.http_ready(),
                    "Kafka connected"
                );
                Ok(events)
            }
            Err(exhausted) => {
                self.state.transition(ConnectionState::Failed);
                tracing::error!(
                    attempts = exhausted.attempts,
                    "Kafka connection failed after maximum retries"
                );
                Err(BrokerError::Exhausted {
                    attempts: exhausted.attempts,
                    last: Box::new(exhausted.last_error),
                })
            }
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
