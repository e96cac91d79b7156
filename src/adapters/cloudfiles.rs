use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    adapters::{StorageAdapter, DEFAULT_CONTENT_TYPE},
    config::{CdnConfig, ConsistencyWait},
    model::{
        cloudfiles::{CloudFilesApi, CloudFilesClient},
        error::{StorageError, StorageResult},
        storage::{encode_key, is_folder, upload_key, BucketSummary, ObjectSummary},
    },
    util::{poll, provider::Provider},
};

/// Container-based adapter. Visibility is a property of the container:
/// a container is public while it is published on the CDN, and every object
/// in it shares that visibility.
pub struct CloudFilesAdapter<C: CloudFilesApi> {
    client: C,
    wait: ConsistencyWait,
    cdn_ttl_secs: u64,
}

impl CloudFilesAdapter<CloudFilesClient> {
    pub fn init(config: &CdnConfig) -> StorageResult<Self> {
        let client = CloudFilesClient::connect(&config.rackspace)?;
        Ok(Self::with_client(
            client,
            config.consistency_wait(ConsistencyWait::cloudfiles()),
            config.cdn_ttl_secs,
        ))
    }
}

impl<C: CloudFilesApi> CloudFilesAdapter<C> {
    pub fn with_client(client: C, wait: ConsistencyWait, cdn_ttl_secs: u64) -> Self {
        Self {
            client,
            wait,
            cdn_ttl_secs,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Public url of an object. The CDN uri is used whether or not the
    /// container is currently published, so callers must check `public`
    /// before handing it out for private data.
    fn object_url(cdn_uri: Option<&str>, name: &str) -> String {
        cdn_uri
            .map(|uri| format!("{}/{}", uri.trim_end_matches('/'), encode_key(name)))
            .unwrap_or_default()
    }
}

impl<C: CloudFilesApi> StorageAdapter for CloudFilesAdapter<C> {
    fn provider(&self) -> Provider {
        Provider::Rackspace
    }

    fn connect_bucket(&self, bucket: &str) -> StorageResult<()> {
        let container = self.client.get_container(bucket)?;
        debug!(container = container.name, objects = container.count, "container bound");
        Ok(())
    }

    fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>> {
        // the per-container visibility call is unreliable, the CDN listing is not
        let public = self.client.list_public_containers()?;

        Ok(self
            .client
            .list_containers()?
            .into_iter()
            .map(|c| BucketSummary {
                public: public.contains(&c.name),
                name: c.name,
                count: c.count,
                size: c.bytes,
            })
            .collect())
    }

    fn create_bucket(&self, bucket: &str, public: bool) -> StorageResult<()> {
        if self.client.container_exists(bucket)? {
            return Err(StorageError::AlreadyExists(bucket.to_string()));
        }

        self.client.create_container(bucket)?;
        info!(container = bucket, public = public, "container created");

        if !poll::wait_until(&self.wait, || self.client.container_exists(bucket))? {
            warn!(container = bucket, attempts = self.wait.max_attempts, "container not visible yet");
            return Err(StorageError::ConsistencyTimeout {
                bucket: bucket.to_string(),
                attempts: self.wait.max_attempts,
            });
        }

        // new containers start unpublished
        if public {
            self.client.enable_cdn(bucket, self.cdn_ttl_secs)?;
        }

        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client.delete_container(bucket)
    }

    fn delete_object(&self, name: &str, bucket: &str) -> StorageResult<()> {
        self.client.delete_object(bucket, name)
    }

    fn list_objects(&self, bucket: &str) -> StorageResult<Vec<ObjectSummary>> {
        let objects = self.client.list_objects(bucket)?;
        if objects.is_empty() {
            return Ok(Vec::new());
        }

        let public = self.is_public(bucket, None)?;
        let cdn_uri = self.client.container_cdn_uri(bucket)?;

        Ok(objects
            .into_iter()
            .map(|o| ObjectSummary {
                url: Self::object_url(cdn_uri.as_deref(), &o.key),
                is_folder: is_folder(&o.key),
                content_type: o.content_type.unwrap_or_default(),
                name: o.key,
                size: o.size,
                last_modified: o.last_modified,
                public,
            })
            .collect())
    }

    fn upload_file(&self, path: &Path, bucket: &str) -> StorageResult<String> {
        let name = upload_key(path).ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no file name in: {}", path.display()),
            ))
        })?;

        let body = std::fs::read(path)?;
        self.client.put_object(bucket, &name, body)?;
        info!(container = bucket, name = name, "uploaded file");

        let cdn_uri = self.client.container_cdn_uri(bucket)?;
        Ok(Self::object_url(cdn_uri.as_deref(), &name))
    }

    fn get_file_contents(&self, name: &str, bucket: &str) -> StorageResult<Vec<u8>> {
        self.client.get_object(bucket, name)
    }

    fn get_content_type(&self, name: &str, bucket: &str) -> StorageResult<String> {
        Ok(self
            .client
            .head_object(bucket, name)?
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()))
    }

    /// Objects have no visibility of their own here; `object` is ignored.
    fn is_public(&self, bucket: &str, _object: Option<&str>) -> StorageResult<bool> {
        Ok(self
            .client
            .list_public_containers()?
            .iter()
            .any(|name| name == bucket))
    }

    fn make_public(&self, bucket: &str) -> StorageResult<()> {
        self.client.enable_cdn(bucket, self.cdn_ttl_secs)
    }

    fn make_private(&self, bucket: &str) -> StorageResult<()> {
        self.client.disable_cdn(bucket)
    }
}
