//! Expiry Sweep Task
//!
//! Backstop for the in-memory store's per-key timers: periodically drops
//! entries that are already past their expiry.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryStore;

/// Spawns a task that sweeps `store` every `interval_secs` seconds.
///
/// The returned handle is aborted during graceful shutdown.
///
/// ```ignore
/// let store = MemoryStore::new(Duration::from_secs(300))?;
/// let sweep_handle = spawn_sweep_task(store.clone(), 30);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(store: MemoryStore, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.sweep_expired();
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
