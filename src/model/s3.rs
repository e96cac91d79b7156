use std::{path::Path, sync::Arc, time::Duration};

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    config::Credentials,
    error::ProvideErrorMetadata,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, Type},
};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::{
    config::{require, AwsCredentials, DEFAULT_AWS_REGION},
    model::{
        error::{StorageError, StorageResult},
        storage::{encode_key, Grant, Grantee, ObjectMeta, Permission, RemoteObject, Visibility},
    },
    util,
};

/// The S3 calls the adapter needs, in vendor-neutral types.
pub trait S3Api: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    fn list_buckets(&self) -> StorageResult<Vec<String>>;

    fn create_bucket(&self, bucket: &str, visibility: Visibility) -> StorageResult<()>;

    fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    fn bucket_grants(&self, bucket: &str) -> StorageResult<Vec<Grant>>;

    fn put_bucket_acl(&self, bucket: &str, visibility: Visibility) -> StorageResult<()>;

    fn list_objects(&self, bucket: &str) -> StorageResult<Vec<RemoteObject>>;

    fn object_grants(&self, bucket: &str, key: &str) -> StorageResult<Vec<Grant>>;

    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMeta>;

    fn put_object(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()>;

    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Permanent, unsigned link to an object.
    fn object_url(&self, bucket: &str, key: &str) -> String;

    /// Signed GET link valid for `expires_in`.
    fn presigned_url(&self, bucket: &str, key: &str, expires_in: Duration) -> StorageResult<String>;
}

pub struct S3Client {
    client: aws_sdk_s3::Client,
    runtime: Arc<Runtime>,
    region: String,
    endpoint: Option<String>,
}

impl S3Client {
    pub fn connect(credentials: &AwsCredentials) -> StorageResult<Self> {
        let key = require(&credentials.key, "aws_key")?;
        let secret_key = require(&credentials.secret_key, "aws_secret_key")?;
        let region = credentials
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());

        let runtime = util::runtime::blocking_runtime()?;
        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.clone()))
                .credentials_provider(Credentials::new(key, secret_key, None, None, "objectcdn"))
                .load(),
        );

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &credentials.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        debug!(region = region, endpoint = ?credentials.endpoint, "s3 client configured");

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            runtime,
            region,
            endpoint: credentials.endpoint.clone(),
        })
    }
}

impl S3Api for S3Client {
    fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        let req = self.client.head_bucket().bucket(bucket);

        match self.runtime.block_on(req.send()) {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    return Ok(false);
                }

                let status = err.raw_response().map(|r| r.status().as_u16());
                match status {
                    Some(404) => Ok(false),
                    // the name belongs to another account
                    Some(403) => Err(StorageError::AlreadyExists(bucket.to_string())),
                    _ => Err(StorageError::vendor("head_bucket", bucket, err)),
                }
            }
        }
    }

    fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let lb = self
            .runtime
            .block_on(self.client.list_buckets().send())
            .map_err(|err| StorageError::vendor("list_buckets", "account", err))?;

        Ok(lb
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(|name| name.to_string()))
            .collect())
    }

    fn create_bucket(&self, bucket: &str, visibility: Visibility) -> StorageResult<()> {
        let mut req = self
            .client
            .create_bucket()
            .bucket(bucket)
            .acl(canned_acl(visibility));

        // us-east-1 rejects an explicit location constraint
        if self.endpoint.is_none() && self.region != DEFAULT_AWS_REGION {
            let cfg = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            req = req.create_bucket_configuration(cfg);
        }

        self.runtime.block_on(req.send()).map_err(|err| {
            if is_bucket_taken(err.code()) {
                StorageError::AlreadyExists(bucket.to_string())
            } else {
                StorageError::vendor("create_bucket", bucket, err)
            }
        })?;

        Ok(())
    }

    fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.runtime
            .block_on(self.client.delete_bucket().bucket(bucket).send())
            .map_err(|err| StorageError::vendor("delete_bucket", bucket, err))?;

        Ok(())
    }

    fn bucket_grants(&self, bucket: &str) -> StorageResult<Vec<Grant>> {
        let acl = self
            .runtime
            .block_on(self.client.get_bucket_acl().bucket(bucket).send())
            .map_err(|err| StorageError::vendor("get_bucket_acl", bucket, err))?;

        Ok(acl.grants().iter().filter_map(convert_grant).collect())
    }

    fn put_bucket_acl(&self, bucket: &str, visibility: Visibility) -> StorageResult<()> {
        let req = self
            .client
            .put_bucket_acl()
            .bucket(bucket)
            .acl(canned_acl(visibility));

        self.runtime
            .block_on(req.send())
            .map_err(|err| StorageError::vendor("put_bucket_acl", bucket, err))?;

        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> StorageResult<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket);

            if let Some(tok) = continuation_token {
                req = req.continuation_token(tok);
            }

            let lo = self
                .runtime
                .block_on(req.send())
                .map_err(|err| StorageError::vendor("list_objects", bucket, err))?;

            for o in lo.contents() {
                objects.push(RemoteObject {
                    key: o.key().unwrap_or("").to_string(),
                    size: o.size().unwrap_or(0).max(0) as u64,
                    last_modified: o.last_modified().map(|t| t.secs()).unwrap_or(0),
                    content_type: None,
                });
            }

            continuation_token = lo.next_continuation_token().map(|tok| tok.to_string());
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    fn object_grants(&self, bucket: &str, key: &str) -> StorageResult<Vec<Grant>> {
        let req = self.client.get_object_acl().bucket(bucket).key(key);

        let acl = match self.runtime.block_on(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_no_such_key() {
                        return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
                    }
                }

                return Err(StorageError::vendor("get_object_acl", key, err));
            }
            Ok(acl) => acl,
        };

        Ok(acl.grants().iter().filter_map(convert_grant).collect())
    }

    fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectMeta> {
        let req = self.client.head_object().bucket(bucket).key(key);

        let ho = match self.runtime.block_on(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
                    }
                }

                return Err(StorageError::vendor("head_object", key, err));
            }
            Ok(ho) => ho,
        };

        Ok(ObjectMeta {
            content_type: ho.content_type().map(|ct| ct.to_string()),
        })
    }

    fn put_object(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()> {
        let body = self
            .runtime
            .block_on(ByteStream::from_path(path))
            .map_err(|err| StorageError::vendor("read_file", &path.display().to_string(), err))?;

        let req = self.client.put_object().bucket(bucket).key(key).body(body);

        self.runtime
            .block_on(req.send())
            .map_err(|err| StorageError::vendor("put_object", key, err))?;

        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let req = self.client.get_object().bucket(bucket).key(key);

        let o = match self.runtime.block_on(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_no_such_key() {
                        return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
                    }
                }

                return Err(StorageError::vendor("get_object", key, err));
            }
            Ok(o) => o,
        };

        let bytes = self
            .runtime
            .block_on(o.body.collect())
            .map_err(|err| StorageError::vendor("collect_body", key, err))?;

        Ok(bytes.into_bytes().to_vec())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let req = self.client.delete_object().bucket(bucket).key(key);

        self.runtime
            .block_on(req.send())
            .map_err(|err| StorageError::vendor("delete_object", key, err))?;

        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        permanent_url(self.endpoint.as_deref(), &self.region, bucket, key)
    }

    fn presigned_url(&self, bucket: &str, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StorageError::vendor("presign", key, err))?;

        let req = self.client.get_object().bucket(bucket).key(key);
        let presigned = self
            .runtime
            .block_on(req.presigned(presigning_config))
            .map_err(|err| StorageError::vendor("presign", key, err))?;

        Ok(presigned.uri().to_string())
    }
}

/// Create errors meaning someone already holds the bucket name.
fn is_bucket_taken(code: Option<&str>) -> bool {
    matches!(code, Some("BucketAlreadyExists") | Some("BucketAlreadyOwnedByYou"))
}

fn canned_acl(visibility: Visibility) -> BucketCannedAcl {
    match visibility {
        Visibility::Public => BucketCannedAcl::PublicRead,
        Visibility::Private => BucketCannedAcl::Private,
    }
}

fn convert_grant(grant: &aws_sdk_s3::types::Grant) -> Option<Grant> {
    let grantee = grant.grantee()?;
    let permission = Permission::parse(grant.permission()?.as_str());

    let grantee = match grantee.r#type() {
        Type::Group => Grantee::Group(grantee.uri()?.to_string()),
        Type::CanonicalUser => Grantee::User(grantee.id()?.to_string()),
        Type::AmazonCustomerByEmail => Grantee::Email(grantee.email_address()?.to_string()),
        _ => return None,
    };

    Some(Grant {
        grantee,
        permission,
    })
}

/// Virtual-hosted url on AWS, path-style on a custom endpoint.
pub fn permanent_url(endpoint: Option<&str>, region: &str, bucket: &str, key: &str) -> String {
    let key = encode_key(key);

    match endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None if region == DEFAULT_AWS_REGION => {
            format!("https://{}.s3.amazonaws.com/{}", bucket, key)
        }
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_url() {
        let cases = vec![
            (None, "us-east-1", "https://photos.s3.amazonaws.com/2024/trip.jpg"),
            (None, "eu-west-1", "https://photos.s3.eu-west-1.amazonaws.com/2024/trip.jpg"),
            (
                Some("http://localhost:9000/"),
                "us-east-1",
                "http://localhost:9000/photos/2024/trip.jpg",
            ),
        ];

        for (endpoint, region, expected) in cases {
            assert_eq!(
                permanent_url(endpoint, region, "photos", "2024/trip.jpg"),
                expected,
                "failed for region: {}",
                region
            );
        }
    }

    #[test]
    fn test_connect_missing_credentials() {
        let cases = vec![
            AwsCredentials::default(),
            AwsCredentials {
                key: Some("AKIA".to_string()),
                ..Default::default()
            },
            AwsCredentials {
                secret_key: Some("secret".to_string()),
                ..Default::default()
            },
        ];

        for credentials in cases {
            assert!(matches!(
                S3Client::connect(&credentials),
                Err(StorageError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_convert_grant() {
        let grant = aws_sdk_s3::types::Grant::builder()
            .grantee(
                aws_sdk_s3::types::Grantee::builder()
                    .r#type(Type::Group)
                    .uri(crate::model::storage::ALL_USERS_URI)
                    .build()
                    .unwrap(),
            )
            .permission(aws_sdk_s3::types::Permission::Read)
            .build();

        let converted = convert_grant(&grant).unwrap();
        assert_eq!(converted.permission, Permission::Read);
        assert_eq!(
            converted.grantee,
            Grantee::Group(crate::model::storage::ALL_USERS_URI.to_string())
        );

        let no_grantee = aws_sdk_s3::types::Grant::builder()
            .permission(aws_sdk_s3::types::Permission::Read)
            .build();
        assert!(convert_grant(&no_grantee).is_none());
    }

    #[test]
    fn test_is_bucket_taken() {
        let cases = vec![
            (Some("BucketAlreadyExists"), true),
            (Some("BucketAlreadyOwnedByYou"), true),
            (Some("InvalidBucketName"), false),
            (None, false),
        ];

        for (code, expected) in cases {
            assert_eq!(is_bucket_taken(code), expected, "failed for case: {:?}", code);
        }
    }

    #[test]
    fn test_bucket_collisions_over_http() {
        use wiremock::{
            matchers::{method, path},
            Mock, MockServer, ResponseTemplate,
        };

        // the mock server gets its own runtime; the client blocks on a separate one
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());

        let mocks = vec![
            Mock::given(method("HEAD"))
                .and(path("/mine"))
                .respond_with(ResponseTemplate::new(200)),
            Mock::given(method("HEAD"))
                .and(path("/missing"))
                .respond_with(ResponseTemplate::new(404)),
            Mock::given(method("HEAD"))
                .and(path("/taken"))
                .respond_with(ResponseTemplate::new(403)),
            Mock::given(method("PUT")).and(path("/photos")).respond_with(
                ResponseTemplate::new(409).set_body_raw(
                    "<Error><Code>BucketAlreadyOwnedByYou</Code>\
                     <Message>Your previous request to create the named bucket succeeded.</Message>\
                     <BucketName>photos</BucketName></Error>",
                    "application/xml",
                ),
            ),
        ];
        for mock in mocks {
            runtime.block_on(mock.mount(&server));
        }

        let client = S3Client::connect(&AwsCredentials {
            key: Some("AKIAEXAMPLE".to_string()),
            secret_key: Some("secret".to_string()),
            region: Some("us-east-1".to_string()),
            endpoint: Some(server.uri()),
        })
        .unwrap();

        assert!(client.bucket_exists("mine").unwrap());
        assert!(!client.bucket_exists("missing").unwrap());
        assert!(matches!(
            client.bucket_exists("taken"),
            Err(StorageError::AlreadyExists(ref b)) if b == "taken"
        ));
        assert!(matches!(
            client.create_bucket("photos", Visibility::Private),
            Err(StorageError::AlreadyExists(ref b)) if b == "photos"
        ));
    }
}
