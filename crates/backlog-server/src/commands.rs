//! Command implementations

use crate::config::{AppConfig, Environment};
use anyhow::Context;
use backlog_core::source::query_with_timeout;
use backlog_core::{
    Broadcaster, Poller, PollerConfig, SnapshotSource, SnapshotStore, SqlSource,
    SubscriberRegistry,
};
use backlog_http::{bind, shutdown_signal, AppState, Server};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

async fn connect(config: &AppConfig) -> anyhow::Result<SqlSource> {
    let url = config.database_url()?;
    let source = SqlSource::connect_with(url, config.max_connections, ACQUIRE_TIMEOUT)
        .await
        .context("Failed to connect to the backlog database")?;
    Ok(source.with_query(config.query.clone()))
}

/// Poll the backlog and serve the feed until Ctrl-C
pub async fn serve(config: AppConfig, env: Environment) -> anyhow::Result<()> {
    let source: Arc<dyn SnapshotSource> = Arc::new(connect(&config).await?);
    let registry = SubscriberRegistry::with_buffer(config.subscriber_buffer);
    let store = Arc::new(SnapshotStore::new());

    let poller = Arc::new(
        Poller::new(
            source.clone(),
            store.clone(),
            Broadcaster::with_policy(registry.clone(), config.delivery_policy()),
        )
        .with_config(
            PollerConfig::default()
                .interval(config.poll_interval())
                .query_timeout(config.query_timeout()),
        ),
    );

    let state = AppState::new(source, registry, store)
        .query_timeout(config.query_timeout())
        .keep_alive(config.keep_alive())
        .expose_errors(env.show_error_details())
        .cors(config.cors());
    let server = Server::new(state, &config.route_prefix)?;
    let listener = bind(&config.bind_addr).await?;

    info!(
        environment = %env,
        interval_secs = config.poll_interval_secs,
        buffer = config.subscriber_buffer,
        "Starting backlog feed"
    );
    let poller_handle = poller.spawn();

    server.serve(listener, shutdown_signal()).await?;
    poller_handle.shutdown().await;
    info!("Backlog feed stopped");
    Ok(())
}

/// Query the source once and print the snapshot
pub async fn check(config: AppConfig) -> anyhow::Result<()> {
    let source = connect(&config).await?;
    let snapshot = query_with_timeout(&source, config.query_timeout()).await?;

    info!(rows = snapshot.len(), "Query succeeded");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
