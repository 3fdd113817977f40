use crate::cache::ClusterCache;
use crate::error::Result;
use crate::source::ClusterSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Configuration for the cache syncer
#[derive(Debug, Clone)]
pub struct CacheSyncerConfig {
    /// Interval between full refreshes
    pub resync_interval: Duration,
}

impl Default for CacheSyncerConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(30),
        }
    }
}

/// Periodically reloads cluster state into a [`ClusterCache`]
pub struct CacheSyncer {
    source: Arc<dyn ClusterSource>,
    cache: Arc<ClusterCache>,
    config: CacheSyncerConfig,
}

impl CacheSyncer {
    pub fn new(
        source: Arc<dyn ClusterSource>,
        cache: Arc<ClusterCache>,
        config: CacheSyncerConfig,
    ) -> Self {
        Self {
            source,
            cache,
            config,
        }
    }

    /// Run the sync loop until `token` is cancelled
    ///
    /// The first refresh happens immediately. A failed refresh keeps the
    /// previous snapshot in place.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!(
            "Starting cache syncer for {} (interval: {:?})",
            self.source.describe(),
            self.config.resync_interval
        );

        let mut interval = tokio::time::interval(self.config.resync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Cache syncer shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sync_once().await {
                        error!("Cache sync from {} failed: {}", self.source.describe(), e);
                    }
                }
            }
        }
    }

    /// Fetch one snapshot and publish it
    pub async fn sync_once(&self) -> Result<()> {
        let start = Instant::now();
        let snapshot = self.source.fetch_snapshot().await?;
        debug!(
            "Synced {} node(s), {} pod(s), {} volume(s), {} claim(s) in {:?}",
            snapshot.node_count(),
            snapshot.pod_count(),
            snapshot.volume_count(),
            snapshot.claim_count(),
            start.elapsed()
        );

        if !self.cache.has_synced() {
            info!("Initial cache sync from {} complete", self.source.describe());
        }
        self.cache.replace(snapshot);
        Ok(())
    }
}
