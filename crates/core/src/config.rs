//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Smallest accepted retention threshold for the garbage collector.
pub const MIN_GC_RETENTION_SECS: u64 = 3600;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the metrics and health endpoints (e.g., "0.0.0.0:9090").
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Expose the Prometheus `/metrics` endpoint.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// S3-compatible blob store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket name.
    pub bucket: String,
    /// Optional endpoint URL (for MinIO, etc.).
    pub endpoint: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// Optional key prefix.
    pub prefix: Option<String>,
    /// AWS access key ID. Falls back to the ambient AWS credential chain if not set.
    pub access_key_id: Option<String>,
    /// AWS secret access key. Falls back to the ambient AWS credential chain if not set.
    pub secret_access_key: Option<String>,
    /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
    #[serde(default)]
    pub force_path_style: bool,
    /// Lifetime of signed upload and download URLs.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

fn default_url_ttl_secs() -> u64 {
    3600
}

impl StorageConfig {
    /// Signed URL lifetime as a std Duration.
    pub fn url_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.url_ttl_secs)
    }

    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.trim().is_empty() {
            return Err("storage.bucket must not be empty".to_string());
        }
        if self.url_ttl_secs == 0 {
            return Err("storage.url_ttl_secs must be greater than zero".to_string());
        }
        // S3 rejects presigned URLs valid for longer than seven days.
        if self.url_ttl_secs > 7 * 24 * 3600 {
            return Err(format!(
                "storage.url_ttl_secs {} exceeds the maximum of 604800",
                self.url_ttl_secs
            ));
        }
        match (self.access_key_id.as_ref(), self.secret_access_key.as_ref()) {
            (Some(_), Some(_)) | (None, None) => Ok(()),
            _ => Err(
                "storage config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ),
        }
    }

    /// A configuration pointing at a local MinIO with static credentials.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            bucket: "depot-test".to_string(),
            endpoint: Some("http://127.0.0.1:9000".to_string()),
            region: Some("us-east-1".to_string()),
            prefix: None,
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio-secret".to_string()),
            force_path_style: true,
            url_ttl_secs: default_url_ttl_secs(),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single node deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        host: Option<String>,
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        username: Option<String>,
        /// Prefer DEPOT_METADATA__PASSWORD over storing the password in a file.
        password: Option<String>,
        database: Option<String>,
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds. PostgreSQL cancels queries exceeding it.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/depot.db"),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err("metadata.path must not be empty".to_string());
                }
                Ok(())
            }
            MetadataConfig::Postgres {
                url,
                host,
                database,
                max_connections,
                ..
            } => {
                if *max_connections == 0 {
                    return Err("metadata.max_connections must be greater than zero".to_string());
                }
                match (url.as_ref(), host.as_ref(), database.as_ref()) {
                    (Some(_), _, _) => Ok(()),
                    (None, Some(_), Some(_)) => Ok(()),
                    (None, None, _) => Err(
                        "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                    ),
                    (None, Some(_), None) => Err(
                        "postgres config requires 'database' when using individual fields"
                            .to_string(),
                    ),
                }
            }
        }
    }
}

/// Read-through cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Time-to-live of cached read results. Bounds read staleness.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Upper bound on cached entries.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_cache_max_entries() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.ttl_secs == 0 {
            return Err("cache.ttl_secs must be greater than zero when caching is enabled".into());
        }
        if self.enabled && self.max_entries == 0 {
            return Err("cache.max_entries must be greater than zero when caching is enabled".into());
        }
        Ok(())
    }
}

/// Garbage collection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Run the collector on a timer inside depotd.
    #[serde(default = "default_gc_enabled")]
    pub enabled: bool,

    /// Interval between collector passes.
    #[serde(default = "default_gc_interval_secs")]
    pub interval_secs: u64,

    /// Log intended deletions without performing them.
    #[serde(default = "default_gc_dry_run")]
    pub dry_run: bool,

    /// Age after which unpublished versions of containers without a TTL are reclaimed.
    #[serde(default = "default_unpublished_version_max_age_secs")]
    pub unpublished_version_max_age_secs: u64,

    /// Objects deleted per batch.
    #[serde(default = "default_gc_batch_size")]
    pub batch_size: u64,

    /// Delete blob rows no object references.
    #[serde(default)]
    pub reap_orphaned_blobs: bool,

    /// Minimum age of an unreferenced blob before it is reaped.
    #[serde(default = "default_orphaned_blob_max_age_secs")]
    pub orphaned_blob_max_age_secs: u64,
}

fn default_gc_enabled() -> bool {
    true
}

fn default_gc_interval_secs() -> u64 {
    3600
}

fn default_gc_dry_run() -> bool {
    true
}

fn default_unpublished_version_max_age_secs() -> u64 {
    7 * 24 * 3600
}

fn default_gc_batch_size() -> u64 {
    crate::DEFAULT_PAGE_SIZE
}

fn default_orphaned_blob_max_age_secs() -> u64 {
    24 * 3600
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: default_gc_enabled(),
            interval_secs: default_gc_interval_secs(),
            dry_run: default_gc_dry_run(),
            unpublished_version_max_age_secs: default_unpublished_version_max_age_secs(),
            batch_size: default_gc_batch_size(),
            reap_orphaned_blobs: false,
            orphaned_blob_max_age_secs: default_orphaned_blob_max_age_secs(),
        }
    }
}

impl GcConfig {
    /// Get the pass interval as a std::time::Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Get the unpublished version retention as a Duration.
    pub fn unpublished_version_max_age(&self) -> Duration {
        Duration::seconds(i64::try_from(self.unpublished_version_max_age_secs).unwrap_or(i64::MAX))
    }

    /// Get the orphaned blob retention as a Duration.
    pub fn orphaned_blob_max_age(&self) -> Duration {
        Duration::seconds(i64::try_from(self.orphaned_blob_max_age_secs).unwrap_or(i64::MAX))
    }

    /// Validate GC configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.unpublished_version_max_age_secs < MIN_GC_RETENTION_SECS {
            return Err(format!(
                "gc.unpublished_version_max_age_secs {} is below the minimum of {} (one hour)",
                self.unpublished_version_max_age_secs, MIN_GC_RETENTION_SECS
            ));
        }
        if self.unpublished_version_max_age_secs > i64::MAX as u64 {
            return Err(format!(
                "gc.unpublished_version_max_age_secs {} exceeds maximum value {}",
                self.unpublished_version_max_age_secs,
                i64::MAX
            ));
        }
        if self.orphaned_blob_max_age_secs < MIN_GC_RETENTION_SECS {
            return Err(format!(
                "gc.orphaned_blob_max_age_secs {} is below the minimum of {} (one hour)",
                self.orphaned_blob_max_age_secs, MIN_GC_RETENTION_SECS
            ));
        }
        if self.orphaned_blob_max_age_secs > i64::MAX as u64 {
            return Err(format!(
                "gc.orphaned_blob_max_age_secs {} exceeds maximum value {}",
                self.orphaned_blob_max_age_secs,
                i64::MAX
            ));
        }
        if self.batch_size == 0 {
            return Err("gc.batch_size must be greater than zero".to_string());
        }
        if self.enabled && self.interval_secs == 0 {
            return Err("gc.interval_secs must be greater than zero".to_string());
        }
        Ok(())
    }

    /// A configuration that performs real deletions.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            dry_run: false,
            reap_orphaned_blobs: true,
            ..Self::default()
        }
    }
}

/// Statistics exporter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "default_exporter_enabled")]
    pub enabled: bool,
    #[serde(default = "default_exporter_interval_secs")]
    pub interval_secs: u64,
}

fn default_exporter_enabled() -> bool {
    true
}

fn default_exporter_interval_secs() -> u64 {
    60
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: default_exporter_enabled(),
            interval_secs: default_exporter_interval_secs(),
        }
    }
}

impl ExporterConfig {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.interval_secs == 0 {
            return Err("exporter.interval_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Page sizes for list operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when a caller asks for a limit of zero.
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    /// Largest page a caller may request.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

fn default_page_size() -> u64 {
    crate::DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> u64 {
    crate::DEFAULT_PAGE_SIZE
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl PaginationConfig {
    /// Resolve a caller-supplied limit against the configured bounds.
    pub fn limit(&self, requested: u64) -> u64 {
        match requested {
            0 => self.default_page_size,
            n => n.min(self.max_page_size),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_page_size == 0 {
            return Err("pagination.default_page_size must be greater than zero".to_string());
        }
        if self.max_page_size < self.default_page_size {
            return Err(format!(
                "pagination.max_page_size {} is smaller than default_page_size {}",
                self.max_page_size, self.default_page_size
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Blob store configuration (required).
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub gc: GcConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl AppConfig {
    /// Validate every section. The first violation is returned.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.cache.validate()?;
        self.gc.validate()?;
        self.exporter.validate()?;
        self.pagination.validate()?;
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::for_testing(),
            metadata: MetadataConfig::default(),
            cache: CacheConfig::default(),
            gc: GcConfig::for_testing(),
            exporter: ExporterConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}
