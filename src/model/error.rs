use thiserror::Error;

/// Errors surfaced by the storage facade and its provider adapters.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("bucket {bucket} did not appear after {attempts} checks")]
    ConsistencyTimeout { bucket: String, attempts: u32 },

    #[error("vendor error: {0}")]
    Vendor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn vendor(op: &str, target: &str, err: impl std::fmt::Display) -> Self {
        StorageError::Vendor(format!("failed to {} at: {}, {}", op, target, err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
