// Bootstrap utilities: wire settings and credentials into a ready engine

use crate::config::Settings;
use crate::config_store::JsonMonitorStore;
use crate::credentials::Credentials;
use crate::dedup::{DedupStore, FileBackend};
use crate::notifier::{HttpNotificationSender, NotifierGateway};
use crate::reddit::{RedditClient, RedditClientConfig};
use crate::runner::MonitorRunner;
use crate::scheduler::{SchedulerConfig, SchedulerEngine};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Reddit client from the `[reddit]` section and the loaded credentials
pub fn build_reddit_client(settings: &Settings, credentials: &Credentials) -> Result<RedditClient> {
    let config = RedditClientConfig {
        api_base_url: settings.reddit.api_base_url.clone(),
        auth_base_url: settings.reddit.auth_base_url.clone(),
        timeout_seconds: settings.reddit.timeout_seconds,
    };
    RedditClient::new(config, credentials.reddit.clone()).context("Failed to create Reddit client")
}

/// Open the seen-posts store, loading what is on disk
#[tracing::instrument(skip(settings))]
pub async fn open_dedup_store(settings: &Settings) -> Arc<DedupStore> {
    let path = settings.storage.seen_posts_path();
    let store = DedupStore::open(
        Arc::new(FileBackend::new(&path)),
        settings.storage.seen_posts_max_bytes,
    )
    .await;
    if store.is_degraded().await {
        warn!(path = %path.display(), "Seen-posts store started empty after a load failure");
    }
    info!(path = %path.display(), keys = store.len().await, "Seen-posts store opened");
    Arc::new(store)
}

pub fn build_gateway(settings: &Settings, credentials: &Credentials) -> Result<NotifierGateway> {
    let sender = HttpNotificationSender::new(settings.notifier.timeout_seconds)
        .context("Failed to create notification sender")?;
    Ok(NotifierGateway::new(
        Arc::new(sender),
        credentials.notification_urls.clone(),
    ))
}

/// Assemble the scheduler engine. Runs and the loop share `cancel`.
#[tracing::instrument(skip_all)]
pub async fn build_engine(
    settings: &Settings,
    credentials: &Credentials,
    cancel: CancellationToken,
) -> Result<SchedulerEngine> {
    let fetcher = Arc::new(build_reddit_client(settings, credentials)?);
    let dedup = open_dedup_store(settings).await;
    let gateway = build_gateway(settings, credentials)?;

    let runner = MonitorRunner::new(fetcher, dedup, gateway, cancel.clone())
        .with_fetch_limit(settings.scheduler.fetch_limit);

    let source = Arc::new(JsonMonitorStore::new(settings.storage.monitors_path()));
    let config = SchedulerConfig {
        poll_interval_seconds: settings.scheduler.poll_interval_seconds,
        max_concurrent_runs: settings.scheduler.max_concurrent_runs,
    };

    info!(
        monitors_path = %settings.storage.monitors_path().display(),
        "Scheduler engine assembled"
    );
    Ok(SchedulerEngine::new(config, source, runner, cancel))
}
