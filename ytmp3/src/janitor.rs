use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::{ArtifactStore, CleanupStats};

/// Shortest period the janitor will run at.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Run one cleanup pass on the blocking pool.
pub async fn cleanup_pass(store: Arc<ArtifactStore>, max_age: Duration) -> CleanupStats {
    match tokio::task::spawn_blocking(move || store.cleanup(max_age)).await {
        Ok(stats) => {
            if stats.removed > 0 || stats.failed > 0 {
                info!(removed = stats.removed, failed = stats.failed, "cleanup pass finished");
            } else {
                debug!("cleanup pass found nothing to remove");
            }
            stats
        }
        Err(e) => {
            warn!(error = %e, "cleanup pass aborted");
            CleanupStats::default()
        }
    }
}

/// Spawn a task that runs a cleanup pass every `interval`, independently of
/// request handling. Intervals shorter than [`MIN_INTERVAL`] are raised to it.
pub fn spawn_janitor(
    store: Arc<ArtifactStore>,
    interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    let interval = if interval < MIN_INTERVAL {
        warn!(
            requested_ms = interval.as_millis() as u64,
            "cleanup interval too short, using {}s",
            MIN_INTERVAL.as_secs()
        );
        MIN_INTERVAL
    } else {
        interval
    };

    info!(
        interval_secs = interval.as_secs(),
        max_age_secs = max_age.as_secs(),
        "starting periodic cleanup"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            cleanup_pass(Arc::clone(&store), max_age).await;
        }
    })
}
