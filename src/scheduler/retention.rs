//! Retention sweep: hourly rollup and pruning of old probe results.
//!
//! Runs once at startup and every 24 hours thereafter. The sweep is
//! best-effort: every step logs and continues on error so a transient
//! storage problem never kills the task.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::RetentionConfig;
use crate::storage::Storage;

const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

pub(crate) async fn run_sweeper(
    storage: Arc<dyn Storage>,
    retention: RetentionConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    debug!("retention sweeper started");

    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    // The first tick fires immediately, which doubles as the startup sweep.
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => sweep(&*storage, &retention).await,
        }
    }

    debug!("retention sweeper stopped");
}

#[instrument(skip_all)]
pub(crate) async fn sweep(storage: &dyn Storage, retention: &RetentionConfig) {
    let results_days = retention.results_days.max(1);
    let cutoff = Utc::now() - Duration::days(results_days);

    // Roll old results into hourly buckets before pruning them.
    if let Err(e) = storage.aggregate_results(cutoff).await {
        warn!("hourly rollup failed: {e}");
    }

    match storage.delete_results_older_than(cutoff).await {
        Ok(0) => debug!("retention sweep: nothing to prune"),
        Ok(deleted) => info!("pruned {deleted} results older than {results_days} days"),
        Err(e) => warn!("retention sweep failed: {e}"),
    }

    if retention.aggregates_days > 0 {
        let cutoff = Utc::now() - Duration::days(retention.aggregates_days);
        match storage.delete_aggregates_older_than(cutoff).await {
            Ok(deleted) if deleted > 0 => debug!("pruned {deleted} hourly aggregates"),
            Ok(_) => {}
            Err(e) => warn!("aggregate pruning failed: {e}"),
        }
    }
}
