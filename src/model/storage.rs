use serde::Serialize;

/// Grantee URI of the S3 "all users" group.
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub count: u64,
    pub size: u64,
    pub public: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub name: String,
    pub size: u64,
    /// Epoch seconds.
    pub last_modified: i64,
    pub url: String,
    pub content_type: String,
    pub public: bool,
    pub is_folder: bool,
}

/// A listing entry as the vendor returns it, before urls and visibility are resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub last_modified: i64,
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub count: u64,
    pub bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grantee {
    Group(String),
    User(String),
    Email(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    ReadAcp,
    WriteAcp,
    FullControl,
    Other(String),
}

impl Permission {
    pub fn parse(value: &str) -> Self {
        match value {
            "READ" => Permission::Read,
            "WRITE" => Permission::Write,
            "READ_ACP" => Permission::ReadAcp,
            "WRITE_ACP" => Permission::WriteAcp,
            "FULL_CONTROL" => Permission::FullControl,
            other => Permission::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

/// Canned access policy applied to a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_public(public: bool) -> Self {
        if public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

pub fn is_folder(key: &str) -> bool {
    key.ends_with('/')
}

/// True when one of the grants gives READ to the all-users group.
pub fn grants_public_read(grants: &[Grant]) -> bool {
    grants.iter().any(|grant| {
        matches!(&grant.grantee, Grantee::Group(uri) if uri == ALL_USERS_URI)
            && grant.permission == Permission::Read
    })
}

/// Percent-encodes each path segment of an object key, keeping the `/` separators.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Last path component of a local file, used as the object key on upload.
pub fn upload_key(path: &std::path::Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
}
