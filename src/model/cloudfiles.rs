use std::sync::Arc;

use reqwest::{header::HeaderMap, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use time::{
    format_description::{well_known::Rfc3339, BorrowedFormatItem},
    macros::format_description,
    OffsetDateTime, PrimitiveDateTime,
};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::{
    config::{require, RackspaceCredentials, DEFAULT_RACKSPACE_AUTH_URL},
    model::{
        error::{StorageError, StorageResult},
        storage::{encode_key, ContainerInfo, ObjectMeta, RemoteObject},
    },
    util,
};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const STORAGE_SERVICE: &str = "cloudFiles";
const CDN_SERVICE: &str = "cloudFilesCDN";
const PAGE_LIMIT: usize = 10000;

/// Swift listings carry naive UTC timestamps like `2024-05-01T10:20:30.123456`.
const SWIFT_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");

/// The Cloud Files calls the adapter needs, in vendor-neutral types.
pub trait CloudFilesApi: Send + Sync {
    fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>>;

    fn container_exists(&self, container: &str) -> StorageResult<bool>;

    fn get_container(&self, container: &str) -> StorageResult<ContainerInfo>;

    fn create_container(&self, container: &str) -> StorageResult<()>;

    fn delete_container(&self, container: &str) -> StorageResult<()>;

    /// Names of the containers currently published on the CDN.
    fn list_public_containers(&self) -> StorageResult<Vec<String>>;

    /// CDN base uri of a container; kept by the vendor after the CDN is disabled.
    fn container_cdn_uri(&self, container: &str) -> StorageResult<Option<String>>;

    fn enable_cdn(&self, container: &str, ttl_secs: u64) -> StorageResult<()>;

    fn disable_cdn(&self, container: &str) -> StorageResult<()>;

    fn list_objects(&self, container: &str) -> StorageResult<Vec<RemoteObject>>;

    fn put_object(&self, container: &str, name: &str, body: Vec<u8>) -> StorageResult<()>;

    fn get_object(&self, container: &str, name: &str) -> StorageResult<Vec<u8>>;

    fn head_object(&self, container: &str, name: &str) -> StorageResult<ObjectMeta>;

    fn delete_object(&self, container: &str, name: &str) -> StorageResult<()>;
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: AuthBody<'a>,
}

#[derive(Serialize)]
struct AuthBody<'a> {
    #[serde(rename = "RAX-KSKEY:apiKeyCredentials")]
    api_key_credentials: ApiKeyCredentials<'a>,
}

#[derive(Serialize)]
struct ApiKeyCredentials<'a> {
    username: &'a str,
    #[serde(rename = "apiKey")]
    api_key: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

#[derive(Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct Endpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Deserialize)]
struct ContainerEntry {
    name: String,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    bytes: u64,
}

#[derive(Deserialize)]
struct CdnContainerEntry {
    name: String,
}

#[derive(Deserialize)]
struct ObjectEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
}

/// Listing entries that can continue a paged listing.
trait Listed {
    fn marker(&self) -> Option<&str>;
}

impl Listed for ContainerEntry {
    fn marker(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Listed for CdnContainerEntry {
    fn marker(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Listed for ObjectEntry {
    fn marker(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Authenticated session against the Cloud Files storage and CDN endpoints.
pub struct CloudFilesClient {
    http: reqwest::Client,
    runtime: Arc<Runtime>,
    token: String,
    storage_url: String,
    cdn_url: String,
}

impl CloudFilesClient {
    pub fn connect(credentials: &RackspaceCredentials) -> StorageResult<Self> {
        let username = require(&credentials.username, "rackspace_username")?;
        let api_key = require(&credentials.api_key, "rackspace_api_key")?;
        let auth_url = credentials
            .auth_url
            .as_deref()
            .unwrap_or(DEFAULT_RACKSPACE_AUTH_URL);

        let runtime = util::runtime::blocking_runtime()?;
        let http = reqwest::Client::new();

        let body = AuthRequest {
            auth: AuthBody {
                api_key_credentials: ApiKeyCredentials { username, api_key },
            },
        };

        let auth: AuthResponse = runtime.block_on(async {
            let resp = http
                .post(auth_url)
                .json(&body)
                .send()
                .await
                .map_err(|err| StorageError::vendor("authenticate", username, err))?;

            if !resp.status().is_success() {
                return Err(StorageError::vendor(
                    "authenticate",
                    username,
                    format!("status {}", resp.status()),
                ));
            }

            resp.json::<AuthResponse>()
                .await
                .map_err(|err| StorageError::vendor("authenticate", username, err))
        })?;

        let region = credentials.region.as_deref();
        let storage_url = select_endpoint(&auth.access.service_catalog, STORAGE_SERVICE, region)?;
        let cdn_url = select_endpoint(&auth.access.service_catalog, CDN_SERVICE, region)?;

        info!(username = username, storage_url = storage_url, "authenticated with cloud files");

        Ok(Self {
            http,
            runtime,
            token: auth.access.token.id,
            storage_url,
            cdn_url,
        })
    }

    fn storage(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.storage_url, path))
            .header(AUTH_TOKEN_HEADER, &self.token)
    }

    fn cdn(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.cdn_url, path))
            .header(AUTH_TOKEN_HEADER, &self.token)
    }

    /// Sends a request and maps 404 to `NotFound`, other failures to `Vendor`.
    fn send(&self, op: &str, target: &str, req: RequestBuilder) -> StorageResult<Response> {
        let resp = self
            .runtime
            .block_on(req.send())
            .map_err(|err| StorageError::vendor(op, target, err))?;

        check_status(op, target, resp.status())?;
        Ok(resp)
    }

    fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        op: &str,
        target: &str,
        req: RequestBuilder,
    ) -> StorageResult<Vec<T>> {
        let resp = self.send(op, target, req)?;

        // an empty account or container answers 204 with no body
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }

        self.runtime
            .block_on(resp.json::<Vec<T>>())
            .map_err(|err| StorageError::vendor(op, target, err))
    }

    /// Follows the listing marker until the vendor returns an empty page.
    fn list_all<T: Listed + for<'de> Deserialize<'de>>(
        &self,
        op: &str,
        target: &str,
        request: impl Fn() -> RequestBuilder,
    ) -> StorageResult<Vec<T>> {
        let mut entries = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut req = request().query(&[("format", "json")]).query(&[("limit", PAGE_LIMIT)]);
            if let Some(m) = &marker {
                req = req.query(&[("marker", m)]);
            }

            let page: Vec<T> = self.send_json(op, target, req)?;
            let next = page.iter().rev().find_map(|e| e.marker()).map(|m| m.to_string());
            entries.extend(page);

            match next {
                Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
                _ => break,
            }
        }

        Ok(entries)
    }
}

impl CloudFilesApi for CloudFilesClient {
    fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        let entries: Vec<ContainerEntry> =
            self.list_all("list_containers", "account", || self.storage(Method::GET, ""))?;

        Ok(entries
            .into_iter()
            .map(|c| ContainerInfo {
                name: c.name,
                count: c.count,
                bytes: c.bytes,
            })
            .collect())
    }

    fn container_exists(&self, container: &str) -> StorageResult<bool> {
        let req = self.storage(Method::HEAD, &urlencoding::encode(container));

        match self.send("head_container", container, req) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn get_container(&self, container: &str) -> StorageResult<ContainerInfo> {
        let req = self.storage(Method::HEAD, &urlencoding::encode(container));
        let resp = self.send("head_container", container, req)?;

        Ok(ContainerInfo {
            name: container.to_string(),
            count: header_u64(resp.headers(), "X-Container-Object-Count"),
            bytes: header_u64(resp.headers(), "X-Container-Bytes-Used"),
        })
    }

    fn create_container(&self, container: &str) -> StorageResult<()> {
        let req = self.storage(Method::PUT, &urlencoding::encode(container));
        self.send("create_container", container, req)?;
        Ok(())
    }

    fn delete_container(&self, container: &str) -> StorageResult<()> {
        let req = self.storage(Method::DELETE, &urlencoding::encode(container));
        self.send("delete_container", container, req)?;
        Ok(())
    }

    fn list_public_containers(&self) -> StorageResult<Vec<String>> {
        let entries: Vec<CdnContainerEntry> = self.list_all("list_cdn_containers", "account", || {
            self.cdn(Method::GET, "").query(&[("enabled_only", "true")])
        })?;

        Ok(entries.into_iter().map(|c| c.name).collect())
    }

    fn container_cdn_uri(&self, container: &str) -> StorageResult<Option<String>> {
        let req = self.cdn(Method::HEAD, &urlencoding::encode(container));

        let resp = match self.send("head_cdn_container", container, req) {
            Ok(resp) => resp,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        Ok(resp
            .headers()
            .get("X-Cdn-Uri")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()))
    }

    fn enable_cdn(&self, container: &str, ttl_secs: u64) -> StorageResult<()> {
        let req = self
            .cdn(Method::PUT, &urlencoding::encode(container))
            .header("X-Cdn-Enabled", "True")
            .header("X-Ttl", ttl_secs.to_string());

        self.send("enable_cdn", container, req)?;
        Ok(())
    }

    fn disable_cdn(&self, container: &str) -> StorageResult<()> {
        let req = self
            .cdn(Method::POST, &urlencoding::encode(container))
            .header("X-Cdn-Enabled", "False");

        self.send("disable_cdn", container, req)?;
        Ok(())
    }

    fn list_objects(&self, container: &str) -> StorageResult<Vec<RemoteObject>> {
        let path = urlencoding::encode(container).into_owned();
        let entries: Vec<ObjectEntry> =
            self.list_all("list_objects", container, || self.storage(Method::GET, &path))?;

        let objects: Vec<RemoteObject> = entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.name?;
                Some(RemoteObject {
                    last_modified: entry
                        .last_modified
                        .as_deref()
                        .map(parse_last_modified)
                        .unwrap_or(0),
                    key: name,
                    size: entry.bytes,
                    content_type: entry.content_type,
                })
            })
            .collect();

        debug!(container = container, count = objects.len(), "listed objects");
        Ok(objects)
    }

    fn put_object(&self, container: &str, name: &str, body: Vec<u8>) -> StorageResult<()> {
        let path = format!("{}/{}", urlencoding::encode(container), encode_key(name));
        let req = self.storage(Method::PUT, &path).body(body);

        self.send("put_object", name, req)?;
        Ok(())
    }

    fn get_object(&self, container: &str, name: &str) -> StorageResult<Vec<u8>> {
        let path = format!("{}/{}", urlencoding::encode(container), encode_key(name));
        let resp = self.send("get_object", name, self.storage(Method::GET, &path))?;

        let bytes = self
            .runtime
            .block_on(resp.bytes())
            .map_err(|err| StorageError::vendor("collect_body", name, err))?;

        Ok(bytes.to_vec())
    }

    fn head_object(&self, container: &str, name: &str) -> StorageResult<ObjectMeta> {
        let path = format!("{}/{}", urlencoding::encode(container), encode_key(name));
        let resp = self.send("head_object", name, self.storage(Method::HEAD, &path))?;

        Ok(ObjectMeta {
            content_type: resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string()),
        })
    }

    fn delete_object(&self, container: &str, name: &str) -> StorageResult<()> {
        let path = format!("{}/{}", urlencoding::encode(container), encode_key(name));
        self.send("delete_object", name, self.storage(Method::DELETE, &path))?;
        Ok(())
    }
}

fn check_status(op: &str, target: &str, status: StatusCode) -> StorageResult<()> {
    if status == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(target.to_string()));
    }
    if !status.is_success() {
        return Err(StorageError::vendor(op, target, format!("status {}", status)));
    }

    Ok(())
}

fn select_endpoint(
    catalog: &[CatalogEntry],
    service: &str,
    region: Option<&str>,
) -> StorageResult<String> {
    let entry = catalog
        .iter()
        .find(|entry| entry.name == service)
        .ok_or_else(|| {
            StorageError::Configuration(format!("service catalog has no {} entry", service))
        })?;

    let endpoint = match region {
        Some(region) => entry.endpoints.iter().find(|e| {
            e.region
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(region))
        }),
        None => entry.endpoints.first(),
    };

    endpoint
        .map(|e| e.public_url.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            StorageError::Configuration(format!(
                "no {} endpoint for region: {}",
                service,
                region.unwrap_or("default")
            ))
        })
}

fn header_u64(headers: &HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Epoch seconds of a listing timestamp, 0 when it cannot be read.
pub fn parse_last_modified(raw: &str) -> i64 {
    if let Ok(dt) = PrimitiveDateTime::parse(raw, SWIFT_TIMESTAMP) {
        return dt.assume_utc().unix_timestamp();
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return dt.unix_timestamp();
    }

    warn!(last_modified = raw, "unreadable timestamp");
    0
}
