use crate::model::error::StorageError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Amazon,
    Rackspace,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Amazon => write!(f, "aws"),
            Provider::Rackspace => write!(f, "rackspace"),
        }
    }
}

pub fn parse_provider(service: &str) -> Result<Provider, StorageError> {
    let service = service.trim();
    if service.is_empty() {
        return Err(StorageError::Configuration(
            "no storage service configured".to_string(),
        ));
    }

    match service.to_lowercase().as_str() {
        "rackspace" => Ok(Provider::Rackspace),
        "aws" | "amazon" | "s3" => Ok(Provider::Amazon),
        _ => Err(StorageError::Configuration(format!(
            "unknown storage service: {}",
            service
        ))),
    }
}
