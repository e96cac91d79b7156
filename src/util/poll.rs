use std::thread;

use tracing::debug;

use crate::{config::ConsistencyWait, model::error::StorageResult};

/// Calls `check` until it reports true, at most `wait.max_attempts` times,
/// sleeping `wait.interval` between calls. Returns `Ok(false)` once the
/// attempts are used up. A disabled wait trusts the caller and returns
/// `Ok(true)` without checking.
pub fn wait_until<F>(wait: &ConsistencyWait, mut check: F) -> StorageResult<bool>
where
    F: FnMut() -> StorageResult<bool>,
{
    if !wait.enabled {
        return Ok(true);
    }

    for attempt in 1..=wait.max_attempts {
        if check()? {
            debug!(attempt = attempt, "condition met");
            return Ok(true);
        }

        if attempt < wait.max_attempts {
            thread::sleep(wait.interval);
        }
    }

    Ok(false)
}
