//! Periodic export of catalog statistics as Prometheus gauges.

use crate::metrics;
use depot_core::Stats;
use depot_metadata::{MetadataResult, MetadataStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn published_label(is_published: bool) -> &'static str {
    if is_published { "true" } else { "false" }
}

/// Replace every catalog gauge with the values in `stats`.
///
/// Labelled gauges are reset first so deleted versions and containers drop out.
pub fn publish(stats: &Stats) {
    metrics::NAMESPACES_AMOUNT.set(gauge_value(stats.namespaces_count));
    metrics::CONTAINERS_AMOUNT.set(gauge_value(stats.containers_count));
    metrics::BLOBS_AMOUNT.set(gauge_value(stats.blobs_count));
    metrics::BLOBS_EFFECTIVE_SIZE_TOTAL_BYTES.set(gauge_value(stats.blobs_effective_size_bytes));

    metrics::VERSIONS_AMOUNT.reset();
    for row in &stats.versions_count {
        metrics::VERSIONS_AMOUNT
            .with_label_values(&[
                row.namespace.as_str(),
                row.container.as_str(),
                published_label(row.is_published),
            ])
            .set(gauge_value(row.count));
    }

    metrics::OBJECTS_AMOUNT.reset();
    for row in &stats.objects_count {
        metrics::OBJECTS_AMOUNT
            .with_label_values(&[
                row.namespace.as_str(),
                row.container.as_str(),
                row.version.as_str(),
                published_label(row.is_published),
            ])
            .set(gauge_value(row.count));
    }

    metrics::BLOBS_RAW_SIZE_BYTES.reset();
    for row in &stats.blobs_raw_size_bytes {
        metrics::BLOBS_RAW_SIZE_BYTES
            .with_label_values(&[
                row.namespace.as_str(),
                row.container.as_str(),
                row.version.as_str(),
                published_label(row.is_published),
            ])
            .set(gauge_value(row.size_bytes));
    }
}

/// Pulls statistics from the metadata store into the gauges.
pub struct StatsExporter {
    metadata: Arc<dyn MetadataStore>,
}

impl StatsExporter {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Recompute statistics and publish them.
    pub async fn refresh(&self) -> MetadataResult<Stats> {
        let stats = match self.metadata.count_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                metrics::STATS_REFRESH_FAILURES.inc();
                return Err(e);
            }
        };
        publish(&stats);
        tracing::debug!(
            namespaces = stats.namespaces_count,
            containers = stats.containers_count,
            blobs = stats.blobs_count,
            effective_bytes = stats.blobs_effective_size_bytes,
            "Catalog statistics refreshed"
        );
        Ok(stats)
    }
}

/// Refresh statistics every `interval` until `cancel` fires.
pub fn spawn_exporter_loop(
    exporter: StatsExporter,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = exporter.refresh().await {
                tracing::warn!(error = %e, "Failed to refresh catalog statistics");
            }
        }

        tracing::info!("Statistics exporter stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::models::{BlobsRawSize, ObjectsCount, VersionsCount};

    fn stats_with_version(version: &str) -> Stats {
        Stats {
            namespaces_count: 2,
            containers_count: 1,
            versions_count: vec![VersionsCount {
                namespace: "acme".into(),
                container: "logs".into(),
                is_published: true,
                count: 1,
            }],
            objects_count: vec![ObjectsCount {
                namespace: "acme".into(),
                container: "logs".into(),
                version: version.into(),
                is_published: true,
                count: 3,
            }],
            blobs_count: 2,
            blobs_raw_size_bytes: vec![BlobsRawSize {
                namespace: "acme".into(),
                container: "logs".into(),
                version: version.into(),
                is_published: true,
                size_bytes: 30,
            }],
            blobs_effective_size_bytes: 20,
        }
    }

    #[test]
    fn test_publish_replaces_label_sets() {
        metrics::register_metrics();

        publish(&stats_with_version("20240101000000"));
        assert_eq!(metrics::NAMESPACES_AMOUNT.get(), 2);
        assert_eq!(metrics::BLOBS_EFFECTIVE_SIZE_TOTAL_BYTES.get(), 20);
        assert_eq!(
            metrics::OBJECTS_AMOUNT
                .with_label_values(&["acme", "logs", "20240101000000", "true"])
                .get(),
            3
        );

        publish(&stats_with_version("20240102000000"));
        let text = String::from_utf8(metrics::render().unwrap()).unwrap();
        assert!(text.contains("20240102000000"));
        assert!(!text.contains("20240101000000"));
    }
}
