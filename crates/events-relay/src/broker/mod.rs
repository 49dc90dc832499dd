//! Broker seam: publishing, subscribing, connection state and retry.
//!
//! The relay only talks to the broker through [`Broker`] and
//! [`EventPublisher`]. Production uses [`kafka::KafkaBroker`]; tests swap in
//! the in-memory broker.

pub mod kafka;
#[cfg(test)]
pub mod memory;
pub mod retry;
pub mod state;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A record read back from a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedEvent {
    pub topic: String,
    pub offset: i64,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection is not established yet")]
    NotConnected,

    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("failed to subscribe to topic '{topic}': {message}")]
    Subscribe { topic: String, message: String },

    #[error("failed to publish to topic '{topic}': {message}")]
    Publish { topic: String, message: String },

    #[error("topic '{0}' is not known to this producer")]
    UnknownTopic(String),

    #[error("broker connection failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<BrokerError>,
    },
}

/// Producer side of an established connection. Shared read-only by every
/// request handler.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append `payload` to `topic`. Returns the record offset when the
    /// broker reports one.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<Option<i64>, BrokerError>;
}

/// Something that can hand out producers and subscriptions.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Connect a producer for `topics`.
    async fn connect_producer(
        &self,
        topics: &[&'static str],
    ) -> Result<Arc<dyn EventPublisher>, BrokerError>;

    /// Subscribe to `topics` from the earliest retained record. Records from
    /// all topics arrive on the returned channel.
    async fn subscribe(
        &self,
        topics: &[&'static str],
    ) -> Result<mpsc::Receiver<ConsumedEvent>, BrokerError>;
}
