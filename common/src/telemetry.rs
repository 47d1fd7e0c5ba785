// Telemetry: structured logging, optional OTLP tracing and Prometheus metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "reddit-monitor";

/// Initialize JSON logging, honouring `RUST_LOG` over `log_level`.
///
/// When `tracing_endpoint` is set, spans are also exported over OTLP.
pub fn init_logging(log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(log_level, tracing_endpoint, "Structured logging initialized");
    Ok(())
}

fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint, "OpenTelemetry tracer initialized");
    Ok(tracer)
}

/// Flush remaining spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter on `0.0.0.0:{metrics_port}`
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("monitor_runs_total", "Monitor runs by outcome");
    describe_counter!(
        "monitor_run_failures_total",
        "Monitor runs that ended with an error"
    );
    describe_counter!("monitor_matches_total", "Posts that passed a monitor's filter");
    describe_counter!("notifications_sent_total", "Notifications delivered");
    describe_counter!("notifications_failed_total", "Notifications not delivered");
    describe_histogram!(
        "scheduler_cycle_duration_seconds",
        "Wall time of one scheduler cycle"
    );
    describe_gauge!("dedup_store_keys", "Keys held by the seen-posts store");

    tracing::info!(metrics_port, "Prometheus metrics exporter initialized");
    Ok(())
}

#[inline]
pub fn record_monitor_run(monitor_id: &str, outcome: &str) {
    counter!(
        "monitor_runs_total",
        "monitor_id" => monitor_id.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_monitor_failure(monitor_id: &str, reason: &str) {
    counter!(
        "monitor_run_failures_total",
        "monitor_id" => monitor_id.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_matches(monitor_id: &str, matched: usize) {
    counter!("monitor_matches_total", "monitor_id" => monitor_id.to_string())
        .increment(matched as u64);
}

#[inline]
pub fn record_notification(delivered: bool) {
    if delivered {
        counter!("notifications_sent_total").increment(1);
    } else {
        counter!("notifications_failed_total").increment(1);
    }
}

#[inline]
pub fn record_cycle_duration(duration_seconds: f64) {
    histogram!("scheduler_cycle_duration_seconds").record(duration_seconds);
}

#[inline]
pub fn update_dedup_size(keys: usize) {
    gauge!("dedup_store_keys").set(keys as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        let first = init_logging("info", None);
        let second = init_logging("debug", None);
        // Only one global subscriber can be installed
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn test_metrics_recording_without_exporter() {
        record_monitor_run("m1", "success");
        record_monitor_failure("m1", "http");
        record_matches("m1", 3);
        record_notification(true);
        record_notification(false);
        record_cycle_duration(0.25);
        update_dedup_size(42);
    }
}
