// Reddit monitor binary entry point

use anyhow::{Context, Result};
use common::bootstrap;
use common::config::Settings;
use common::credentials::{await_credentials, FileCredentialsProvider};
use common::errors::CredentialsError;
use common::scheduler::Scheduler;
use common::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Reddit monitor");

    if settings.observability.metrics_port > 0 {
        telemetry::init_metrics(settings.observability.metrics_port)?;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let provider = FileCredentialsProvider::new(settings.storage.credentials_path());
    let credentials = match await_credentials(
        &provider,
        Duration::from_secs(settings.scheduler.credentials_poll_seconds),
        &cancel,
    )
    .await
    {
        Ok(credentials) => credentials,
        Err(CredentialsError::Cancelled) => {
            info!("Shutdown requested while waiting for credentials");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to load credentials"),
    };
    if let Err(e) = credentials.validate() {
        warn!(error = %e, "Credentials look invalid, Reddit authentication may fail");
    }

    let engine = Arc::new(bootstrap::build_engine(&settings, &credentials, cancel.clone()).await?);

    let result = engine.start().await;
    telemetry::shutdown_tracer();

    if let Err(e) = result {
        error!(error = %e, "Scheduler error");
        return Err(e).context("Scheduler failed");
    }

    info!("Reddit monitor stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM (`docker stop`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }

    info!("Initiating graceful shutdown");
}
