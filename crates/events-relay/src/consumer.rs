//! Diagnostic sink: logs every record read back from the relay's topics.
//!
//! Nothing downstream depends on it; it only makes published events visible
//! in the relay's own logs.

use tokio::sync::mpsc;

use crate::broker::ConsumedEvent;

/// Drain `events` until every sender is gone. Returns how many records were
/// seen.
pub async fn drain(mut events: mpsc::Receiver<ConsumedEvent>) -> u64 {
    let mut seen = 0;
    while let Some(event) = events.recv().await {
        seen += 1;
        tracing::info!(
            topic = %event.topic,
            offset = event.offset,
            payload = %String::from_utf8_lossy(&event.payload),
            "Received from Kafka topic"
        );
    }
    tracing::info!(seen, "Diagnostic consumer stopped");
    seen
}
