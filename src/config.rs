use std::{collections::HashMap, time::Duration};

use crate::model::error::{StorageError, StorageResult};

pub const DEFAULT_RACKSPACE_AUTH_URL: &str = "https://identity.api.rackspacecloud.com/v2.0/tokens";
pub const DEFAULT_AWS_REGION: &str = "us-east-1";
pub const DEFAULT_CDN_TTL_SECS: u64 = 86400;

const KEYS: [&str; 11] = [
    "cdn_service",
    "rackspace_username",
    "rackspace_api_key",
    "rackspace_region",
    "rackspace_auth_url",
    "rackspace_cdn_ttl",
    "aws_key",
    "aws_secret_key",
    "aws_region",
    "aws_endpoint",
    "cdn_wait_for_create",
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RackspaceCredentials {
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub auth_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AwsCredentials {
    pub key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

/// Bounded wait for a freshly created bucket to become visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsistencyWait {
    pub enabled: bool,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl ConsistencyWait {
    pub fn cloudfiles() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }

    pub fn s3() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CdnConfig {
    pub service: Option<String>,
    pub rackspace: RackspaceCredentials,
    pub aws: AwsCredentials,
    pub cdn_ttl_secs: u64,
    pub wait_for_create: bool,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            service: None,
            rackspace: RackspaceCredentials::default(),
            aws: AwsCredentials::default(),
            cdn_ttl_secs: DEFAULT_CDN_TTL_SECS,
            wait_for_create: true,
        }
    }
}

impl CdnConfig {
    /// Builds a config from a flat key/value mapping such as
    /// `aws_key`, `aws_secret_key`, `rackspace_api_key`, `cdn_service`.
    /// Blank values count as absent.
    pub fn from_map(values: &HashMap<String, String>) -> StorageResult<Self> {
        let get = |key: &str| {
            values
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };

        let cdn_ttl_secs = match get("rackspace_cdn_ttl") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                StorageError::Configuration(format!("invalid rackspace_cdn_ttl: {}", raw))
            })?,
            None => DEFAULT_CDN_TTL_SECS,
        };

        let wait_for_create = match get("cdn_wait_for_create") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                StorageError::Configuration(format!("invalid cdn_wait_for_create: {}", raw))
            })?,
            None => true,
        };

        Ok(Self {
            service: get("cdn_service"),
            rackspace: RackspaceCredentials {
                username: get("rackspace_username"),
                api_key: get("rackspace_api_key"),
                region: get("rackspace_region"),
                auth_url: get("rackspace_auth_url"),
            },
            aws: AwsCredentials {
                key: get("aws_key"),
                secret_key: get("aws_secret_key"),
                region: get("aws_region"),
                endpoint: get("aws_endpoint"),
            },
            cdn_ttl_secs,
            wait_for_create,
        })
    }

    /// Reads the same keys, upper-cased, from the process environment.
    pub fn from_env() -> StorageResult<Self> {
        let mut values = HashMap::new();
        for key in KEYS {
            if let Ok(value) = std::env::var(key.to_uppercase()) {
                values.insert(key.to_string(), value);
            }
        }

        Self::from_map(&values)
    }

    pub fn consistency_wait(&self, base: ConsistencyWait) -> ConsistencyWait {
        ConsistencyWait {
            enabled: self.wait_for_create,
            ..base
        }
    }
}

/// Returns the value of a credential field or a configuration error naming it.
pub fn require<'a>(value: &'a Option<String>, name: &str) -> StorageResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StorageError::Configuration(format!("missing credential: {}", name)))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
