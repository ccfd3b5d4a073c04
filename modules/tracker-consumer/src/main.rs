use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracker_common::Config;
use tracker_consumer::shutdown::cancel_on_signal;
use tracker_consumer::{kafka::KafkaBus, metrics, ConsumerMetrics, EventLoop};
use tracker_store::{build_resolver, DimensionResolver, PgStore};

const CACHE_REPORT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Payload tracker consumer starting...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.log_redacted();

    if config.metrics_port > 0 {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics_port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        metrics::describe();
        info!(port = config.metrics_port, "Metrics exporter listening");
    }

    let store = Arc::new(
        PgStore::connect(&config.database_url, config.database_max_connections)
            .await
            .context("Failed to connect to database")?,
    );
    let resolver = build_resolver(config.resolver, store.clone());
    let bus = KafkaBus::connect(&config.kafka).context("Failed to connect to Kafka")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    tokio::spawn(report_cache_stats(resolver.clone(), cancel.clone()));

    let counters = Arc::new(ConsumerMetrics::new());
    EventLoop::new(bus, store, resolver)
        .with_metrics(counters.clone())
        .run(cancel)
        .await;

    info!(
        consumed = counters.consumed(),
        errors = counters.errors(),
        "Payload tracker consumer stopped"
    );
    Ok(())
}

/// Periodically log and export resolver cache sizes until shutdown.
async fn report_cache_stats(resolver: Arc<dyn DimensionResolver>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(CACHE_REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let Some(stats) = resolver.cache_stats() else {
            break;
        };
        metrics::record_cache_stats(&stats);
        info!(
            statuses = stats.statuses,
            services = stats.services,
            sources = stats.sources,
            "Dimension cache entries"
        );
    }
}
