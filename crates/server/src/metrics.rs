//! Prometheus metrics for depot.
//!
//! Catalog gauges are refreshed by the [`exporter`](crate::exporter); the
//! counters below are updated inline by the manager and garbage collector.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Gauge labels carry namespace, container and version names, so the endpoint
//! must only be reachable from the scraper's network.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

const VERSION_LABELS: &[&str] = &["namespace", "container", "version", "is_published"];

// Catalog gauges
pub static NAMESPACES_AMOUNT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("depot_namespaces_amount", "Number of namespaces")
        .expect("metric creation failed")
});

pub static CONTAINERS_AMOUNT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("depot_containers_amount", "Number of containers")
        .expect("metric creation failed")
});

pub static VERSIONS_AMOUNT: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "depot_versions_amount",
            "Number of versions per container and publish state",
        ),
        &["namespace", "container", "is_published"],
    )
    .expect("metric creation failed")
});

pub static OBJECTS_AMOUNT: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new("depot_objects_amount", "Number of objects per version"),
        VERSION_LABELS,
    )
    .expect("metric creation failed")
});

pub static BLOBS_AMOUNT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("depot_blobs_amount", "Number of distinct blobs")
        .expect("metric creation failed")
});

pub static BLOBS_RAW_SIZE_BYTES: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "depot_blobs_raw_size_bytes",
            "Bytes referenced by each version before deduplication",
        ),
        VERSION_LABELS,
    )
    .expect("metric creation failed")
});

pub static BLOBS_EFFECTIVE_SIZE_TOTAL_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "depot_blobs_effective_size_total_bytes",
        "Bytes stored after deduplication",
    )
    .expect("metric creation failed")
});

pub static STATS_REFRESH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_stats_refresh_failures_total",
        "Total number of failed catalog statistics refreshes",
    )
    .expect("metric creation failed")
});

// Upload handshake metrics
pub static BLOBS_REGISTERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_blobs_registered_total",
        "Total number of blobs registered with an upload URL",
    )
    .expect("metric creation failed")
});

pub static BLOBS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_blobs_deduplicated_total",
        "Total number of upload requests answered by an existing blob",
    )
    .expect("metric creation failed")
});

// GC metrics
pub static GC_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_gc_runs_total", "Total GC passes by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static GC_ITEMS_DELETED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("depot_gc_items_deleted_total", "Total items deleted by GC"),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static GC_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_gc_errors_total",
        "Total per-item failures logged by GC",
    )
    .expect("metric creation failed")
});

pub static GC_RUN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("depot_gc_run_duration_seconds", "GC pass duration").buckets(vec![
            0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests may call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(NAMESPACES_AMOUNT.clone()),
            Box::new(CONTAINERS_AMOUNT.clone()),
            Box::new(VERSIONS_AMOUNT.clone()),
            Box::new(OBJECTS_AMOUNT.clone()),
            Box::new(BLOBS_AMOUNT.clone()),
            Box::new(BLOBS_RAW_SIZE_BYTES.clone()),
            Box::new(BLOBS_EFFECTIVE_SIZE_TOTAL_BYTES.clone()),
            Box::new(STATS_REFRESH_FAILURES.clone()),
            Box::new(BLOBS_REGISTERED.clone()),
            Box::new(BLOBS_DEDUPLICATED.clone()),
            Box::new(GC_RUNS.clone()),
            Box::new(GC_ITEMS_DELETED.clone()),
            Box::new(GC_ERRORS.clone()),
            Box::new(GC_RUN_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// Render the registry in the Prometheus text format.
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    match render() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}
