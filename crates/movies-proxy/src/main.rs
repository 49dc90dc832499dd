//! movies-proxy: migration router sending a configurable share of
//! `/api/movies` traffic to the new movies service and the rest to the
//! monolith.

mod config;
mod proxy;
mod routing;
mod server;

use std::time::Duration;

use config::{MigrationPolicy, ProxyConfig};
use server::AppState;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("MOVIES_PROXY_CONFIG").ok())
        .unwrap_or_else(|| "movies-proxy.toml".to_string());

    let config = ProxyConfig::load(&config_path)?;

    // Refuse to start before any listener exists.
    let policy = MigrationPolicy::from_config(&config)?;

    // Build the tokio runtime first: the tonic gRPC exporter needs a reactor context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let _tracing_guard = migration_tracing::init_tracing(&config.tracing, "movies-proxy");

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.listen_address(),
            monolith = %policy.monolith,
            movies_service = ?policy.new_service.as_ref().map(|u| u.as_str()),
            gradual_migration = policy.gradual,
            migration_percent = policy.percent,
            "Starting movies-proxy"
        );

        run(config, policy).await
    })
}

async fn run(config: ProxyConfig, policy: MigrationPolicy) -> anyhow::Result<()> {
    // Redirects belong to the caller; relay them instead of following.
    let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
    if let Some(secs) = config.upstream.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder.build()?;

    let state = AppState { policy, client };

    server::run(state, &config.listen_address()).await
}
