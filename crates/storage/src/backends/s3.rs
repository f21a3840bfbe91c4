//! S3-compatible blob store issuing presigned URLs.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobStore, content_disposition, validate_key};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;
use tracing::instrument;

/// Upper bound S3 accepts for presigned URL lifetimes.
const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

/// S3-compatible blob store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    url_ttl: Duration,
    /// Normalized endpoint, kept for diagnostics.
    endpoint: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("url_ttl", &self.url_ttl)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// Without explicit credentials the ambient AWS credential chain is used.
    /// `force_path_style` is required for MinIO and some S3-compatible services.
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
        url_ttl: Duration,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }
        if url_ttl.is_zero() || url_ttl > MAX_PRESIGN_TTL {
            return Err(StorageError::Config(format!(
                "signed URL ttl must be between 1s and {}s, got {}s",
                MAX_PRESIGN_TTL.as_secs(),
                url_ttl.as_secs()
            )));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let region = aws_config::Region::new(resolved_region.clone());

        let mut builder = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials =
                    aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "depot-config");
                aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        // Bare host:port endpoints (e.g., "minio:9000") are treated as plain HTTP.
        let normalized_endpoint = endpoint.map(|endpoint_url| {
            let lower = endpoint_url.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            }
        });

        if let Some(endpoint_url) = &normalized_endpoint {
            builder = builder.endpoint_url(endpoint_url);
        }
        if force_path_style {
            builder = builder.force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        let endpoint = normalized_endpoint
            .unwrap_or_else(|| format!("s3.{resolved_region}.amazonaws.com"));
        let prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        tracing::info!(
            bucket = bucket,
            endpoint = %endpoint,
            prefix = ?prefix,
            url_ttl_secs = url_ttl.as_secs(),
            "S3 blob store configured"
        );

        Ok(Self {
            client,
            bucket: bucket.to_string(),
            prefix,
            url_ttl,
            endpoint,
        })
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    fn presigning_config(&self) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(self.url_ttl).map_err(|e| StorageError::Presign(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn put_blob_url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .presigned(self.presigning_config()?)
            .await
            .map_err(map_s3_operation_error)?;
        Ok(request.uri().to_string())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_blob_url(
        &self,
        key: &str,
        mime_type: &str,
        filename: &str,
    ) -> StorageResult<String> {
        validate_key(key)?;
        let mut request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .response_content_disposition(content_disposition(filename));
        if !mime_type.is_empty() {
            request = request.response_content_type(mime_type);
        }
        let request = request
            .presigned(self.presigning_config()?)
            .await
            .map_err(map_s3_operation_error)?;
        Ok(request.uri().to_string())
    }

    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let head = self.client.head_bucket().bucket(&self.bucket).send();
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, head).await {
            Ok(result) => {
                result.map_err(map_s3_operation_error)?;
                Ok(())
            }
            Err(_) => Err(StorageError::Timeout(format!(
                "head bucket '{}' did not answer within {}s",
                self.bucket,
                HEALTH_CHECK_TIMEOUT.as_secs()
            ))),
        }
    }
}
