//! Garbage collector for expired unpublished versions and orphaned blobs.
//!
//! A pass walks every namespace, container and unpublished version. Versions
//! older than their retention threshold lose their objects in batches, each
//! batch re-read from offset zero, and are then deleted. Failures on one
//! version are logged and counted; the sweep moves on. Published versions are
//! never touched.
//!
//! When enabled, a reaper pass afterwards removes blob rows no object
//! references (abandoned uploads, remapped or deleted objects) once they are
//! older than the configured age, together with unreferenced object keys.

use crate::metrics;
use depot_core::config::GcConfig;
use depot_core::{Container, Version};
use depot_metadata::{MetadataError, MetadataStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Counters for one collector pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub containers_scanned: u64,
    pub versions_deleted: u64,
    pub objects_deleted: u64,
    pub blobs_deleted: u64,
    pub object_keys_deleted: u64,
    pub errors: u64,
    /// The pass stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// Failures that abort a whole pass.
#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error("a garbage collection pass is already running")]
    AlreadyRunning,

    #[error("failed to list namespaces: {0}")]
    ListNamespaces(#[source] MetadataError),
}

/// Outcome of sweeping one version.
enum VersionOutcome {
    Deleted,
    Skipped,
    Failed,
    Cancelled,
}

/// Garbage collector over an (uncached) metadata store.
pub struct GarbageCollector {
    metadata: Arc<dyn MetadataStore>,
    config: GcConfig,
    clock: Clock,
    running: Mutex<()>,
}

impl GarbageCollector {
    /// Create a collector. Pass the uncached store: cached listings could hide recent writes.
    pub fn new(metadata: Arc<dyn MetadataStore>, config: GcConfig) -> Self {
        Self::with_clock(metadata, config, Arc::new(OffsetDateTime::now_utc))
    }

    pub fn with_clock(metadata: Arc<dyn MetadataStore>, config: GcConfig, clock: Clock) -> Self {
        Self {
            metadata,
            config,
            clock,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Run one pass. Only one pass runs at a time per collector.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<GcStats, GcError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| GcError::AlreadyRunning)?;

        let started = Instant::now();
        let now = (self.clock)();
        let dry_run = self.config.dry_run;
        let mut stats = GcStats::default();

        tracing::info!(dry_run = dry_run, "Garbage collection pass started");

        let result = self.sweep_versions(now, cancel, &mut stats).await;
        if let Err(e) = result {
            metrics::GC_RUNS.with_label_values(&["failed"]).inc();
            tracing::error!(error = %e, "Garbage collection pass failed");
            return Err(e);
        }

        if self.config.reap_orphaned_blobs && !stats.cancelled {
            self.reap_orphans(now, cancel, &mut stats).await;
        }

        let outcome = if stats.cancelled {
            "cancelled"
        } else if stats.errors > 0 {
            "partial"
        } else {
            "ok"
        };
        metrics::GC_RUNS.with_label_values(&[outcome]).inc();
        metrics::GC_RUN_DURATION.observe(started.elapsed().as_secs_f64());
        if !dry_run {
            metrics::GC_ITEMS_DELETED
                .with_label_values(&["version"])
                .inc_by(stats.versions_deleted);
            metrics::GC_ITEMS_DELETED
                .with_label_values(&["object"])
                .inc_by(stats.objects_deleted);
            metrics::GC_ITEMS_DELETED
                .with_label_values(&["blob"])
                .inc_by(stats.blobs_deleted);
            metrics::GC_ITEMS_DELETED
                .with_label_values(&["object_key"])
                .inc_by(stats.object_keys_deleted);
        }

        tracing::info!(
            dry_run = dry_run,
            outcome = outcome,
            containers_scanned = stats.containers_scanned,
            versions_deleted = stats.versions_deleted,
            objects_deleted = stats.objects_deleted,
            blobs_deleted = stats.blobs_deleted,
            object_keys_deleted = stats.object_keys_deleted,
            errors = stats.errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Garbage collection pass finished"
        );

        Ok(stats)
    }

    fn record_error(stats: &mut GcStats) {
        stats.errors += 1;
        metrics::GC_ERRORS.inc();
    }

    /// Expiry threshold for a container's unpublished versions.
    ///
    /// `None` when the retention reaches past the earliest representable time,
    /// so nothing in the container can have expired.
    fn threshold(&self, now: OffsetDateTime, container: &Container) -> Option<OffsetDateTime> {
        let max_age = if container.retains_forever() {
            self.config.unpublished_version_max_age()
        } else {
            container.versions_ttl
        };
        now.checked_sub(max_age)
    }

    async fn sweep_versions(
        &self,
        now: OffsetDateTime,
        cancel: &CancellationToken,
        stats: &mut GcStats,
    ) -> Result<(), GcError> {
        let namespaces = self
            .metadata
            .list_namespaces()
            .await
            .map_err(GcError::ListNamespaces)?;

        for namespace in &namespaces {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                return Ok(());
            }

            let containers = match self.metadata.list_containers(namespace).await {
                Ok(containers) => containers,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(namespace = %namespace, "Namespace vanished during sweep");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(namespace = %namespace, error = %e, "Failed to list containers");
                    Self::record_error(stats);
                    continue;
                }
            };

            for container in &containers {
                if cancel.is_cancelled() {
                    stats.cancelled = true;
                    return Ok(());
                }
                stats.containers_scanned += 1;
                self.sweep_container(namespace, container, now, cancel, stats)
                    .await;
                if stats.cancelled {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn sweep_container(
        &self,
        namespace: &str,
        container: &Container,
        now: OffsetDateTime,
        cancel: &CancellationToken,
        stats: &mut GcStats,
    ) {
        let Some(threshold) = self.threshold(now, container) else {
            tracing::debug!(
                namespace = %namespace,
                container = %container.name,
                versions_ttl = %container.versions_ttl,
                "Retention exceeds the representable time range, skipping container"
            );
            return;
        };

        let versions = match self
            .metadata
            .list_unpublished_versions_by_container(namespace, &container.name)
            .await
        {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => return,
            Err(e) => {
                tracing::warn!(
                    namespace = %namespace,
                    container = %container.name,
                    error = %e,
                    "Failed to list unpublished versions"
                );
                Self::record_error(stats);
                return;
            }
        };

        tracing::debug!(
            namespace = %namespace,
            container = %container.name,
            unpublished = versions.len(),
            threshold = %threshold,
            "Scanning container"
        );

        for version in versions.iter().filter(|v| v.created_at < threshold) {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                return;
            }

            match self
                .collect_version(namespace, &container.name, version, cancel, stats)
                .await
            {
                VersionOutcome::Deleted => stats.versions_deleted += 1,
                VersionOutcome::Skipped => {}
                VersionOutcome::Failed => Self::record_error(stats),
                VersionOutcome::Cancelled => {
                    stats.cancelled = true;
                    return;
                }
            }
        }
    }

    async fn collect_version(
        &self,
        namespace: &str,
        container: &str,
        version: &Version,
        cancel: &CancellationToken,
        stats: &mut GcStats,
    ) -> VersionOutcome {
        let name = version.name.as_str();
        let mut previous_total: Option<u64> = None;

        loop {
            if cancel.is_cancelled() {
                return VersionOutcome::Cancelled;
            }

            let (total, keys) = match self
                .metadata
                .list_objects(namespace, container, name, 0, self.config.batch_size)
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_not_found() => return VersionOutcome::Skipped,
                Err(e) => {
                    tracing::warn!(
                        namespace = %namespace,
                        container = %container,
                        version = %name,
                        error = %e,
                        "Failed to list objects of expired version"
                    );
                    return VersionOutcome::Failed;
                }
            };

            if total == 0 || keys.is_empty() {
                break;
            }

            if self.config.dry_run {
                tracing::info!(
                    namespace = %namespace,
                    container = %container,
                    version = %name,
                    objects = total,
                    "Dry run: would delete objects"
                );
                break;
            }

            // Deleting a batch must shrink the remaining set.
            if previous_total.is_some_and(|previous| total >= previous) {
                tracing::warn!(
                    namespace = %namespace,
                    container = %container,
                    version = %name,
                    remaining = total,
                    "Object deletion made no progress, leaving version for the next pass"
                );
                return VersionOutcome::Failed;
            }
            previous_total = Some(total);

            match self
                .metadata
                .delete_unpublished_objects(namespace, container, name, &keys)
                .await
            {
                Ok(()) => {}
                // Published or deleted since it was listed.
                Err(e) if e.is_not_found() => return VersionOutcome::Skipped,
                Err(e) => {
                    tracing::warn!(
                        namespace = %namespace,
                        container = %container,
                        version = %name,
                        batch = keys.len(),
                        error = %e,
                        "Failed to delete object batch"
                    );
                    return VersionOutcome::Failed;
                }
            }
            stats.objects_deleted += keys.len() as u64;
        }

        if self.config.dry_run {
            tracing::info!(
                namespace = %namespace,
                container = %container,
                version = %name,
                created_at = %version.created_at,
                "Dry run: would delete version"
            );
            return VersionOutcome::Skipped;
        }

        match self
            .metadata
            .delete_unpublished_version(namespace, container, name)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    namespace = %namespace,
                    container = %container,
                    version = %name,
                    "Deleted expired version"
                );
                VersionOutcome::Deleted
            }
            Err(e) if e.is_not_found() => VersionOutcome::Skipped,
            Err(e) => {
                tracing::warn!(
                    namespace = %namespace,
                    container = %container,
                    version = %name,
                    error = %e,
                    "Failed to delete expired version"
                );
                VersionOutcome::Failed
            }
        }
    }

    async fn reap_orphans(
        &self,
        now: OffsetDateTime,
        cancel: &CancellationToken,
        stats: &mut GcStats,
    ) {
        let Some(older_than) = now.checked_sub(self.config.orphaned_blob_max_age()) else {
            tracing::debug!("Orphaned blob retention exceeds the representable time range");
            return;
        };

        loop {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                return;
            }

            let orphans = match self
                .metadata
                .list_orphaned_blobs(older_than, self.config.batch_size)
                .await
            {
                Ok(orphans) => orphans,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list orphaned blobs");
                    Self::record_error(stats);
                    return;
                }
            };
            if orphans.is_empty() {
                break;
            }

            if self.config.dry_run {
                tracing::info!(
                    blobs = orphans.len(),
                    bytes = orphans.iter().map(|b| b.size).sum::<u64>(),
                    "Dry run: would delete orphaned blobs"
                );
                return;
            }

            let mut removed_any = false;
            for blob in &orphans {
                match self
                    .metadata
                    .delete_blob_if_orphaned(&blob.checksum, blob.size)
                    .await
                {
                    Ok(true) => {
                        removed_any = true;
                        stats.blobs_deleted += 1;
                    }
                    // Referenced again since it was listed.
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            checksum = %blob.checksum,
                            size = blob.size,
                            error = %e,
                            "Failed to delete orphaned blob"
                        );
                        Self::record_error(stats);
                    }
                }
            }
            if !removed_any {
                break;
            }
        }

        match self.metadata.delete_orphaned_object_keys().await {
            Ok(count) => stats.object_keys_deleted += count,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to delete orphaned object keys");
                Self::record_error(stats);
            }
        }
    }
}

/// Run the collector every `gc.interval_secs` until `cancel` fires.
pub fn spawn_gc_loop(gc: Arc<GarbageCollector>, cancel: CancellationToken) -> JoinHandle<()> {
    let interval = gc.config().interval();
    tokio::spawn(async move {
        tracing::info!(
            interval_secs = interval.as_secs(),
            dry_run = gc.config().dry_run,
            "Garbage collector scheduled"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; wait one full interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match gc.run(&cancel).await {
                Ok(stats) if stats.cancelled => break,
                Ok(_) => {}
                Err(GcError::AlreadyRunning) => {
                    tracing::debug!("Previous garbage collection pass still running, skipping");
                }
                Err(e) => tracing::error!(error = %e, "Garbage collection pass aborted"),
            }
        }

        tracing::info!("Garbage collector stopped");
    })
}
