use std::path::Path;

use tracing::{debug, info, span, warn, Level};

use crate::{
    adapters::{cloudfiles::CloudFilesAdapter, s3::S3Adapter, StorageAdapter},
    config::CdnConfig,
    model::{
        error::{StorageError, StorageResult},
        storage::{BucketSummary, ObjectSummary},
    },
    util::provider::{parse_provider, Provider},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorState {
    message: String,
    error: bool,
}

/// Facade over one provider adapter, chosen once at construction.
///
/// Every operation takes an optional bucket; `None` (or an empty name) falls
/// back to the bucket bound with [`Cdn::connect_bucket`]. The outcome of the
/// latest call is also kept for [`Cdn::has_error`] and [`Cdn::last_error`].
///
/// Calls block the current thread. Build and use a `Cdn` outside any tokio
/// runtime; construction fails with a configuration error when one is active.
pub struct Cdn {
    adapter: Box<dyn StorageAdapter>,
    bound: Option<String>,
    error: ErrorState,
}

impl Cdn {
    /// Selects the adapter for `service` and initialises it with the
    /// credentials in `config`.
    pub fn new(service: &str, config: &CdnConfig) -> StorageResult<Self> {
        let span = span!(Level::INFO, "cdn", service = service);
        let _e = span.enter();

        let adapter: Box<dyn StorageAdapter> = match parse_provider(service)? {
            Provider::Amazon => Box::new(S3Adapter::init(config)?),
            Provider::Rackspace => Box::new(CloudFilesAdapter::init(config)?),
        };
        info!(provider = %adapter.provider(), "adapter initialised");

        Ok(Self::with_adapter(adapter))
    }

    /// Same as [`Cdn::new`] with the service named by `cdn_service`.
    pub fn from_config(config: &CdnConfig) -> StorageResult<Self> {
        let service = config.service.as_deref().ok_or_else(|| {
            StorageError::Configuration(
                "no cdn_service configured and no service passed".to_string(),
            )
        })?;

        Self::new(service, config)
    }

    pub fn with_adapter(adapter: Box<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            bound: None,
            error: ErrorState::default(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.adapter.provider()
    }

    /// Currently bound bucket, if any.
    pub fn bucket(&self) -> Option<&str> {
        self.bound.as_deref()
    }

    pub fn last_error(&self) -> &str {
        &self.error.message
    }

    pub fn has_error(&self) -> bool {
        self.error.error
    }

    /// Binds the default bucket. Rebinding to the bound name does nothing; an
    /// empty name keeps the current binding and fails when there is none.
    pub fn connect_bucket(&mut self, bucket: &str) -> StorageResult<()> {
        let result = self.bind(bucket);
        self.record(result)
    }

    pub fn list_buckets(&mut self) -> StorageResult<Vec<BucketSummary>> {
        let result = self.adapter.list_buckets();
        self.record(result)
    }

    pub fn create_bucket(&mut self, bucket: &str, public: bool) -> StorageResult<()> {
        let result = self.adapter.create_bucket(bucket, public);
        self.record(result)
    }

    pub fn delete_bucket(&mut self, bucket: &str) -> StorageResult<()> {
        let result = self.adapter.delete_bucket(bucket);
        self.record(result)
    }

    pub fn delete_object(&mut self, name: &str, bucket: Option<&str>) -> StorageResult<()> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.delete_object(name, &bucket));
        self.record(result)
    }

    pub fn list_objects(&mut self, bucket: Option<&str>) -> StorageResult<Vec<ObjectSummary>> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.list_objects(&bucket));
        self.record(result)
    }

    pub fn upload_file(&mut self, path: &Path, bucket: Option<&str>) -> StorageResult<String> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.upload_file(path, &bucket));
        self.record(result)
    }

    pub fn get_file_contents(&mut self, name: &str, bucket: Option<&str>) -> StorageResult<Vec<u8>> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.get_file_contents(name, &bucket));
        self.record(result)
    }

    pub fn get_content_type(&mut self, name: &str, bucket: Option<&str>) -> StorageResult<String> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.get_content_type(name, &bucket));
        self.record(result)
    }

    pub fn is_public(&mut self, bucket: Option<&str>, object: Option<&str>) -> StorageResult<bool> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.is_public(&bucket, object));
        self.record(result)
    }

    pub fn make_public(&mut self, bucket: Option<&str>) -> StorageResult<()> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.make_public(&bucket));
        self.record(result)
    }

    pub fn make_private(&mut self, bucket: Option<&str>) -> StorageResult<()> {
        let result = self
            .resolve(bucket)
            .and_then(|bucket| self.adapter.make_private(&bucket));
        self.record(result)
    }

    fn bind(&mut self, bucket: &str) -> StorageResult<()> {
        if bucket.is_empty() {
            return match self.bound {
                Some(_) => Ok(()),
                None => Err(not_connected()),
            };
        }

        if self.bound.as_deref() == Some(bucket) {
            return Ok(());
        }

        self.adapter.connect_bucket(bucket)?;
        debug!(bucket = bucket, previous = ?self.bound, "bucket bound");
        self.bound = Some(bucket.to_string());

        Ok(())
    }

    fn resolve(&self, bucket: Option<&str>) -> StorageResult<String> {
        match bucket.filter(|b| !b.is_empty()) {
            Some(bucket) => Ok(bucket.to_string()),
            None => self.bound.clone().ok_or_else(not_connected),
        }
    }

    fn record<T>(&mut self, result: StorageResult<T>) -> StorageResult<T> {
        match &result {
            Ok(_) => self.error = ErrorState::default(),
            Err(err) => {
                warn!(error = %err, "storage call failed");
                self.error = ErrorState {
                    message: err.to_string(),
                    error: true,
                };
            }
        }

        result
    }
}

fn not_connected() -> StorageError {
    StorageError::NotFound("not connected to any bucket".to_string())
}
