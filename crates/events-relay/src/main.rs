//! events-relay: accepts domain events over HTTP and publishes them to
//! Kafka topics, with a diagnostic consumer reading the same topics back.

mod broker;
mod config;
mod consumer;
mod relay;
mod server;
mod topics;

use std::sync::Arc;

use anyhow::Context;
use broker::kafka::KafkaBroker;
use config::RelayConfig;
use relay::Relay;
use server::AppState;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("EVENTS_RELAY_CONFIG").ok())
        .unwrap_or_else(|| "events-relay.toml".to_string());

    let config = RelayConfig::load(&config_path)?;

    // Build the tokio runtime first: the tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let _tracing_guard = migration_tracing::init_tracing(&config.tracing, "events-relay");

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.listen_address(),
            brokers = ?config.kafka_brokers,
            consumer_enabled = config.consumer.enabled,
            "Starting events-relay"
        );

        run(config).await
    })
}

/// Start the broker connection and the HTTP listener side by side.
///
/// The listener does not wait for the broker; publishes that arrive first
/// fail with a server error. If the broker connection exhausts its retries
/// the server is stopped and the process exits non-zero.
async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let relay = Arc::new(Relay::new());

    let kafka = KafkaBroker::new(config.kafka_brokers.clone(), config.kafka.clone());
    let policy = config.retry.policy();
    let subscribe = config.consumer.enabled;
    let startup = tokio::spawn({
        let relay = relay.clone();
        async move {
            let events = relay.connect(&kafka, &policy, subscribe).await?;
            if let Some(events) = events {
                tokio::spawn(consumer::drain(events));
            }
            Ok::<_, broker::BrokerError>(())
        }
    });

    let listen_addr = config.listen_address();
    let mut server = tokio::spawn(async move {
        server::run(AppState { relay }, &listen_addr).await
    });

    tokio::select! {
        res = &mut server => return res.context("HTTP server task panicked")?,
        res = startup => {
            if let Err(e) = res.context("broker startup task panicked")? {
                server.abort();
                return Err(e).context("Kafka connection failed after maximum retries. Exiting");
            }
        }
    }

    server.await.context("HTTP server task panicked")?
}
