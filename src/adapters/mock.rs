use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::model::{
    cloudfiles::CloudFilesApi,
    error::{StorageError, StorageResult},
    s3::{permanent_url, S3Api},
    storage::{
        ContainerInfo, Grant, Grantee, ObjectMeta, Permission, RemoteObject, Visibility,
        ALL_USERS_URI,
    },
};

#[derive(Clone, Debug, Default)]
pub struct MockObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub last_modified: i64,
    pub grants: Vec<Grant>,
}

#[derive(Clone, Debug, Default)]
pub struct MockBucket {
    pub objects: BTreeMap<String, MockObject>,
    pub grants: Vec<Grant>,
    pub cdn_enabled: bool,
    pub cdn_uri: Option<String>,
    /// False until the existence check has seen it after creation.
    pub visible: bool,
}

#[derive(Default)]
pub struct MockState {
    pub buckets: BTreeMap<String, MockBucket>,
    /// Existence checks that still answer "missing" for a freshly created bucket.
    pub pending_checks: u32,
    pub calls: HashMap<&'static str, usize>,
}

impl MockState {
    fn call(&mut self, name: &'static str) {
        *self.calls.entry(name).or_insert(0) += 1;
    }

    fn bucket(&self, name: &str) -> StorageResult<&MockBucket> {
        self.buckets
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn bucket_mut(&mut self, name: &str) -> StorageResult<&mut MockBucket> {
        self.buckets
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn object(&self, bucket: &str, key: &str) -> StorageResult<&MockObject> {
        self.bucket(bucket)?
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, key)))
    }

    fn exists(&mut self, name: &str) -> bool {
        let pending = self.pending_checks;
        match self.buckets.get_mut(name) {
            None => false,
            Some(bucket) if bucket.visible => true,
            Some(bucket) => {
                if pending > 0 {
                    self.pending_checks -= 1;
                    false
                } else {
                    bucket.visible = true;
                    true
                }
            }
        }
    }
}

pub fn public_read_grant() -> Grant {
    Grant {
        grantee: Grantee::Group(ALL_USERS_URI.to_string()),
        permission: Permission::Read,
    }
}

pub fn owner_grant() -> Grant {
    Grant {
        grantee: Grantee::User("owner".to_string()),
        permission: Permission::FullControl,
    }
}

/// In-memory vendor double shared by both provider traits, counting every call.
/// Clones share state, so a test can keep a handle after handing one to an adapter.
#[derive(Clone, Default)]
pub struct MockClient {
    pub state: Arc<Mutex<MockState>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freshly created buckets stay invisible for `checks` existence checks.
    pub fn with_pending_checks(checks: u32) -> Self {
        let client = Self::default();
        client.state.lock().unwrap().pending_checks = checks;
        client
    }

    pub fn add_bucket(&self, name: &str, public: bool) {
        let mut grants = vec![owner_grant()];
        if public {
            grants.push(public_read_grant());
        }

        self.state.lock().unwrap().buckets.insert(
            name.to_string(),
            MockBucket {
                grants,
                cdn_enabled: public,
                cdn_uri: public.then(|| format!("https://cdn.example.com/{}", name)),
                visible: true,
                ..Default::default()
            },
        );
    }

    pub fn add_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
        last_modified: i64,
        public: bool,
    ) {
        let mut grants = vec![owner_grant()];
        if public {
            grants.push(public_read_grant());
        }

        let mut state = self.state.lock().unwrap();
        let bucket = state.buckets.entry(bucket.to_string()).or_default();
        bucket.visible = true;
        bucket.objects.insert(
            key.to_string(),
            MockObject {
                body: body.to_vec(),
                content_type: Some(content_type.to_string()),
                last_modified,
                grants,
            },
        );
    }

    pub fn calls(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.state.lock().unwrap().buckets.contains_key(name)
    }

    fn remote_objects(state: &MockState, bucket: &str) -> StorageResult<Vec<RemoteObject>> {
        Ok(state
            .bucket(bucket)?
            .objects
            .iter()
            .map(|(key, o)| RemoteObject {
                key: key.clone(),
                size: o.body.len() as u64,
                last_modified: o.last_modified,
                content_type: o.content_type.clone(),
            })
            .collect())
    }
}

impl S3Api for MockClient {
    fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.call("bucket_exists");
        Ok(state.exists(bucket))
    }

    fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_buckets");
        Ok(state.buckets.keys().cloned().collect())
    }

    fn create_bucket(&self, bucket: &str, visibility: Visibility) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("create_bucket");

        let mut grants = vec![owner_grant()];
        if visibility == Visibility::Public {
            grants.push(public_read_grant());
        }
        state.buckets.insert(
            bucket.to_string(),
            MockBucket {
                grants,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("delete_bucket");
        state
            .buckets
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(bucket.to_string()))
    }

    fn bucket_grants(&self, bucket: &str) -> StorageResult<Vec<Grant>> {
        let mut state = self.state.lock().unwrap();
        state.call("bucket_grants");
        Ok(state.bucket(bucket)?.grants.clone())
    }

    fn put_bucket_acl(&self, bucket: &str, visibility: Visibility) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("put_bucket_acl");

        let bucket = state.bucket_mut(bucket)?;
        bucket.grants = vec![owner_grant()];
        if visibility == Visibility::Public {
            bucket.grants.push(public_read_grant());
        }
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> StorageResult<Vec<RemoteObject>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_objects");
        Self::remote_objects(&state, bucket).map(|objects| {
            objects
                .into_iter()
                .map(|o| RemoteObject {
                    content_type: None,
                    ..o
                })
                .collect()
        })
    }

    fn object_grants(&self, bucket: &str, key: &str) -> StorageResult<Vec<Grant>> {
        let mut state = self.state.lock().unwrap();
        state.call("object_grants");
        Ok(state.object(bucket, key)?.grants.clone())
    }

    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMeta> {
        let mut state = self.state.lock().unwrap();
        state.call("head_object");
        let object = state.object(bucket, key)?;
        Ok(ObjectMeta {
            content_type: object.content_type.clone(),
        })
    }

    fn put_object(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()> {
        let body = std::fs::read(path)?;
        let mut state = self.state.lock().unwrap();
        state.call("put_object");
        state.bucket_mut(bucket)?.objects.insert(
            key.to_string(),
            MockObject {
                body,
                grants: vec![owner_grant()],
                ..Default::default()
            },
        );
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.call("get_object");
        Ok(state.object(bucket, key)?.body.clone())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("delete_object");
        state
            .bucket_mut(bucket)?
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        permanent_url(None, "us-east-1", bucket, key)
    }

    fn presigned_url(&self, bucket: &str, key: &str, expires_in: Duration) -> StorageResult<String> {
        Ok(format!(
            "{}?X-Amz-Expires={}",
            permanent_url(None, "us-east-1", bucket, key),
            expires_in.as_secs()
        ))
    }
}

impl CloudFilesApi for MockClient {
    fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_containers");
        Ok(state
            .buckets
            .iter()
            .map(|(name, b)| ContainerInfo {
                name: name.clone(),
                count: b.objects.len() as u64,
                bytes: b.objects.values().map(|o| o.body.len() as u64).sum(),
            })
            .collect())
    }

    fn container_exists(&self, container: &str) -> StorageResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.call("container_exists");
        Ok(state.exists(container))
    }

    fn get_container(&self, container: &str) -> StorageResult<ContainerInfo> {
        let mut state = self.state.lock().unwrap();
        state.call("get_container");
        let bucket = state.bucket(container)?;
        Ok(ContainerInfo {
            name: container.to_string(),
            count: bucket.objects.len() as u64,
            bytes: bucket.objects.values().map(|o| o.body.len() as u64).sum(),
        })
    }

    fn create_container(&self, container: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("create_container");
        state
            .buckets
            .insert(container.to_string(), MockBucket::default());
        Ok(())
    }

    fn delete_container(&self, container: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("delete_container");
        state
            .buckets
            .remove(container)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(container.to_string()))
    }

    fn list_public_containers(&self) -> StorageResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_public_containers");
        Ok(state
            .buckets
            .iter()
            .filter(|(_, b)| b.cdn_enabled)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn container_cdn_uri(&self, container: &str) -> StorageResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.call("container_cdn_uri");
        Ok(state.bucket(container)?.cdn_uri.clone())
    }

    fn enable_cdn(&self, container: &str, _ttl_secs: u64) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("enable_cdn");
        let bucket = state.bucket_mut(container)?;
        bucket.cdn_enabled = true;
        if bucket.cdn_uri.is_none() {
            bucket.cdn_uri = Some(format!("https://cdn.example.com/{}", container));
        }
        Ok(())
    }

    fn disable_cdn(&self, container: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("disable_cdn");
        state.bucket_mut(container)?.cdn_enabled = false;
        Ok(())
    }

    fn list_objects(&self, container: &str) -> StorageResult<Vec<RemoteObject>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_objects");
        Self::remote_objects(&state, container)
    }

    fn put_object(&self, container: &str, name: &str, body: Vec<u8>) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("put_object");
        state.bucket_mut(container)?.objects.insert(
            name.to_string(),
            MockObject {
                body,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn get_object(&self, container: &str, name: &str) -> StorageResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.call("get_object");
        Ok(state.object(container, name)?.body.clone())
    }

    fn head_object(&self, container: &str, name: &str) -> StorageResult<ObjectMeta> {
        let mut state = self.state.lock().unwrap();
        state.call("head_object");
        let object = state.object(container, name)?;
        Ok(ObjectMeta {
            content_type: object.content_type.clone(),
        })
    }

    fn delete_object(&self, container: &str, name: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("delete_object");
        state
            .bucket_mut(container)?
            .objects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}
