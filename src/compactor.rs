use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::repository::RepositoryError;
use crate::store::Store;

/// Compact the store's WAL once `threshold` appends have piled up since
/// the last compaction. Returns whether the log was rewritten.
pub async fn compact_if_due(store: &Store, threshold: u64) -> Result<bool, RepositoryError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    let compacted = store.compact_wal().await?;
    if compacted {
        info!("compacted WAL after {appends} appends");
    } else {
        debug!("WAL compaction deferred: {appends} appends pending");
    }
    Ok(compacted)
}

/// Background task that periodically compacts the WAL.
pub async fn run_compactor(store: Arc<Store>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&store, threshold).await {
            error!("WAL compaction failed: {e}");
        }
    }
}
