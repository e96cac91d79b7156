use std::{path::Path, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    adapters::{StorageAdapter, DEFAULT_CONTENT_TYPE},
    config::{CdnConfig, ConsistencyWait},
    model::{
        error::{StorageError, StorageResult},
        s3::{S3Api, S3Client},
        storage::{
            grants_public_read, is_folder, upload_key, BucketSummary, ObjectSummary, Visibility,
        },
    },
    util::{poll, provider::Provider},
};

/// Lifetime of the signed link handed out for private objects.
pub const PRIVATE_URL_TTL: Duration = Duration::from_secs(5 * 60);

pub struct S3Adapter<C: S3Api> {
    client: C,
    wait: ConsistencyWait,
}

impl S3Adapter<S3Client> {
    pub fn init(config: &CdnConfig) -> StorageResult<Self> {
        let client = S3Client::connect(&config.aws)?;
        Ok(Self::with_client(
            client,
            config.consistency_wait(ConsistencyWait::s3()),
        ))
    }
}

impl<C: S3Api> S3Adapter<C> {
    pub fn with_client(client: C, wait: ConsistencyWait) -> Self {
        Self { client, wait }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn object_url(&self, bucket: &str, key: &str, public: bool) -> StorageResult<String> {
        if public {
            Ok(self.client.object_url(bucket, key))
        } else {
            self.client.presigned_url(bucket, key, PRIVATE_URL_TTL)
        }
    }
}

impl<C: S3Api> StorageAdapter for S3Adapter<C> {
    fn provider(&self) -> Provider {
        Provider::Amazon
    }

    fn connect_bucket(&self, bucket: &str) -> StorageResult<()> {
        if !self.client.bucket_exists(bucket)? {
            return Err(StorageError::NotFound(bucket.to_string()));
        }

        Ok(())
    }

    fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>> {
        let mut buckets = Vec::new();

        for name in self.client.list_buckets()? {
            let objects = self.client.list_objects(&name)?;
            let public = grants_public_read(&self.client.bucket_grants(&name)?);

            buckets.push(BucketSummary {
                count: objects.len() as u64,
                size: objects.iter().map(|o| o.size).sum(),
                public,
                name,
            });
        }

        Ok(buckets)
    }

    fn create_bucket(&self, bucket: &str, public: bool) -> StorageResult<()> {
        if self.client.bucket_exists(bucket)? {
            return Err(StorageError::AlreadyExists(bucket.to_string()));
        }

        self.client
            .create_bucket(bucket, Visibility::from_public(public))?;
        info!(bucket = bucket, public = public, "bucket created");

        if !poll::wait_until(&self.wait, || self.client.bucket_exists(bucket))? {
            warn!(bucket = bucket, attempts = self.wait.max_attempts, "bucket not visible yet");
            return Err(StorageError::ConsistencyTimeout {
                bucket: bucket.to_string(),
                attempts: self.wait.max_attempts,
            });
        }

        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client.delete_bucket(bucket)
    }

    fn delete_object(&self, name: &str, bucket: &str) -> StorageResult<()> {
        self.client.delete_object(bucket, name)
    }

    fn list_objects(&self, bucket: &str) -> StorageResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();

        for o in self.client.list_objects(bucket)? {
            let public = grants_public_read(&self.client.object_grants(bucket, &o.key)?);
            let content_type = match o.content_type {
                Some(content_type) => content_type,
                None => self
                    .client
                    .head_object(bucket, &o.key)?
                    .content_type
                    .unwrap_or_default(),
            };

            objects.push(ObjectSummary {
                url: self.object_url(bucket, &o.key, public)?,
                is_folder: is_folder(&o.key),
                name: o.key,
                size: o.size,
                last_modified: o.last_modified,
                content_type,
                public,
            });
        }

        debug!(bucket = bucket, count = objects.len(), "listed objects");
        Ok(objects)
    }

    fn upload_file(&self, path: &Path, bucket: &str) -> StorageResult<String> {
        let key = upload_key(path).ok_or_else(|| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("no file name in: {}", path.display()),
            ))
        })?;

        self.client.put_object(bucket, &key, path)?;
        info!(bucket = bucket, key = key, "uploaded file");

        Ok(self.client.object_url(bucket, &key))
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

    fn is_public(&self, bucket: &str, object: Option<&str>) -> StorageResult<bool> {
        let grants = match object {
            Some(key) if !key.is_empty() => self.client.object_grants(bucket, key)?,
            _ => self.client.bucket_grants(bucket)?,
        };

        Ok(grants_public_read(&grants))
    }

    fn make_public(&self, bucket: &str) -> StorageResult<()> {
        self.client.put_bucket_acl(bucket, Visibility::Public)
    }

    fn make_private(&self, bucket: &str) -> StorageResult<()> {
        self.client.put_bucket_acl(bucket, Visibility::Private)
    }
}
