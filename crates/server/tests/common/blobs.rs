//! Fake blob store that records the URLs it hands out.

use async_trait::async_trait;
use depot_storage::{BlobStore, StorageError, StorageResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A request made against [`RecordingBlobStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub enum BlobRequest {
    Put { key: String },
    Get { key: String, mime_type: String, filename: String },
}

/// Blob store returning predictable fake URLs and remembering every request.
#[derive(Default)]
pub struct RecordingBlobStore {
    requests: Mutex<Vec<BlobRequest>>,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl RecordingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail.
    pub fn fail_requests(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<BlobRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| matches!(r, BlobRequest::Put { .. }))
            .count()
    }

    fn check(&self) -> StorageResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Presign("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put_blob_url(&self, key: &str) -> StorageResult<String> {
        self.check()?;
        self.requests.lock().unwrap().push(BlobRequest::Put {
            key: key.to_string(),
        });
        Ok(format!("https://blobs.test/{key}?op=put"))
    }

    async fn get_blob_url(
        &self,
        key: &str,
        mime_type: &str,
        filename: &str,
    ) -> StorageResult<String> {
        self.check()?;
        self.requests.lock().unwrap().push(BlobRequest::Get {
            key: key.to_string(),
            mime_type: mime_type.to_string(),
            filename: filename.to_string(),
        });
        Ok(format!("https://blobs.test/{key}?op=get&filename={filename}"))
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.check()
    }
}
