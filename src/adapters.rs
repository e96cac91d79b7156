use std::path::Path;

use crate::{
    model::{
        error::StorageResult,
        storage::{BucketSummary, ObjectSummary},
    },
    util::provider::Provider,
};

pub mod cloudfiles;
#[cfg(test)]
pub mod mock;
pub mod s3;

/// Operations every provider adapter offers. The bucket is always passed
/// explicitly; adapters keep no per-bucket state between calls.
pub trait StorageAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Resolves the vendor-side handle of a bucket, failing if it does not exist.
    fn connect_bucket(&self, bucket: &str) -> StorageResult<()>;

    fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>>;

    /// Creates a bucket and waits for it to become visible. Fails with
    /// `AlreadyExists` when the name is taken and `ConsistencyTimeout` when
    /// the bucket does not show up within the configured wait.
    fn create_bucket(&self, bucket: &str, public: bool) -> StorageResult<()>;

    /// Deletes a bucket without checking that it is empty first.
    fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    fn delete_object(&self, name: &str, bucket: &str) -> StorageResult<()>;

    fn list_objects(&self, bucket: &str) -> StorageResult<Vec<ObjectSummary>>;

    /// Uploads a local file under its base name and returns the object url.
    fn upload_file(&self, path: &Path, bucket: &str) -> StorageResult<String>;

    fn get_file_contents(&self, name: &str, bucket: &str) -> StorageResult<Vec<u8>>;

    fn get_content_type(&self, name: &str, bucket: &str) -> StorageResult<String>;

    fn is_public(&self, bucket: &str, object: Option<&str>) -> StorageResult<bool>;

    fn make_public(&self, bucket: &str) -> StorageResult<()>;

    fn make_private(&self, bucket: &str) -> StorageResult<()>;
}

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
