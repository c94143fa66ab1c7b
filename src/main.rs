use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use volition::config::AgencyConfig;
use volition::intent::LifecycleController;
use volition::kernel::reactor::Reactor;
use volition::services::capability::CapabilityRegistry;
use volition::services::llm::HttpModel;
use volition::signals::{InboxAggregator, SignalAggregator};
use volition::store::IntentionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("volitiond booting");

    let config = AgencyConfig::from_env().context("loading configuration")?;
    let store = Arc::new(
        IntentionStore::open(&config.data_dir)
            .await
            .with_context(|| format!("opening store at {}", config.data_dir.display()))?,
    );
    tracing::info!(root = %store.root().display(), "store opened");

    let llm = Arc::new(HttpModel::new(config.llm.clone()));
    let catalog = Arc::new(CapabilityRegistry::with_builtins());

    let mut aggregators: Vec<Arc<dyn SignalAggregator>> = Vec::new();
    if let Some(dir) = &config.inbox_dir {
        tracing::info!(inbox = %dir.display(), "watching signal inbox");
        aggregators.push(Arc::new(InboxAggregator::new(dir.clone())));
    }

    let controller = Arc::new(LifecycleController::new(store, llm, catalog, config));
    let mut reactor = Reactor::new(controller.clone(), aggregators);

    let root = CancellationToken::new();
    let shutdown = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    tracing::info!("volitiond active. Press Ctrl+C to stop.");
    reactor.run(root).await;

    let snapshot = controller.telemetry();
    tracing::info!(
        created = snapshot.intention_stats.created,
        executions = snapshot.execution_stats.count,
        "volitiond stopped"
    );
    Ok(())
}
