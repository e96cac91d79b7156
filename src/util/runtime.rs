use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::model::error::{StorageError, StorageResult};

/// Runtime the vendor clients block on; the facade itself is synchronous.
///
/// Blocking on it from a thread that already runs tokio would panic, so
/// clients built under an existing runtime are refused up front.
pub fn blocking_runtime() -> StorageResult<Arc<Runtime>> {
    if Handle::try_current().is_ok() {
        return Err(StorageError::Configuration(
            "storage clients block and cannot be created inside a tokio runtime".to_string(),
        ));
    }

    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("objectcdn-io")
        .enable_all()
        .build()
        .map_err(|err| StorageError::Configuration(format!("failed to start runtime: {}", err)))?;

    Ok(Arc::new(runtime))
}
