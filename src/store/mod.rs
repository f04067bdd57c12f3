//! Object storage abstraction (§4.B).
//!
//! `ObjectStore` is a trait rather than a concrete client so the pipeline
//! and retention sweep stay backend-agnostic — tests run against
//! [`memory::MemoryStore`], production runs against [`s3::S3Store`]. This
//! mirrors the way the teacher keeps its AWS usage (`src/aws.rs`) behind a
//! thin config/client boundary rather than threading SDK types through
//! business logic.

pub mod key;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// One 1 MiB part of a chunked upload (§4.B), grounded in the adaptive
/// block size used by `src/file_chunker.rs` and
/// `original_source/src/azure_client.py::_upload_in_blocks`.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Retry attempts per chunk before giving up on a chunked upload.
pub const CHUNK_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Content-addressed object store contract. All operations are idempotent
/// where the underlying backend allows it; `put`/`put_chunked` always
/// overwrite atomically rather than appending or erroring on existing keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Upload `data` in [`CHUNK_SIZE`] parts, retrying each part up to
    /// [`CHUNK_RETRY_ATTEMPTS`] times before failing the whole upload, then
    /// committing all parts atomically.
    async fn put_chunked(&self, key: &str, data: Vec<u8>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>>;

    /// Delete is idempotent: deleting a key that doesn't exist returns
    /// `Ok(false)` rather than an error.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Delete everything under `prefix` older than `older_than_days`,
    /// judged by the object's own last-modified time, returning the count
    /// removed. This mirrors `cleanup_old_blobs`: pruning is driven by
    /// object age, not by cross-referencing the catalog, so it stays
    /// correct even if the catalog and the store briefly disagree.
    async fn prune(&self, prefix: &str, older_than_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days as i64);
        let mut removed = 0;
        for object in self.list(prefix).await? {
            if object.last_modified < cutoff && self.delete(&object.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Cheap connectivity/credentials check used at startup.
    async fn test_connection(&self) -> Result<bool>;
}

/// Exponential backoff delay before retry attempt `attempt` (0-indexed) of a
/// whole-object put, matching `azure_client.py::upload_blob`'s
/// `(attempt + 1) * 2` second sleep.
pub fn backoff_delay(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_secs(2 * (attempt as u64 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly_in_attempts() {
        assert_eq!(backoff_delay(0), std::time::Duration::from_secs(2));
        assert_eq!(backoff_delay(1), std::time::Duration::from_secs(4));
        assert_eq!(backoff_delay(2), std::time::Duration::from_secs(6));
    }
}
