use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error};

use super::MetadataResult;
use super::cache::MetadataCache;

/// Re-reads metadata sources into a shared cache on a fixed interval.
///
/// Readers keep using the cache while a refresh runs; each descriptor is swapped in
/// atomically.
#[derive(Debug, Clone)]
pub struct MetadataRefresher {
    cache: MetadataCache,
    sources: Arc<Vec<String>>,
    interval: Duration,
}

impl MetadataRefresher {
    pub fn new(cache: MetadataCache, sources: Vec<String>, interval: Duration) -> Self {
        Self {
            cache,
            sources: Arc::new(sources),
            interval,
        }
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Parse every source once; returns the number of descriptors indexed.
    pub fn refresh_now(&self) -> MetadataResult<usize> {
        debug!(sources = self.sources.len(), "refreshing metadata");
        self.cache.parse(self.sources.iter())
    }

    /// Spawn the refresh loop. The first refresh runs immediately.
    pub fn start(self) -> JoinHandle<()> {
        debug!(
            "Starting metadata refresher with interval of {:?}",
            self.interval
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            loop {
                ticker.tick().await;
                match self.refresh_now() {
                    Ok(count) => debug!("Scheduled metadata refresh indexed {} descriptors", count),
                    Err(e) => error!("Scheduled metadata refresh failed: {}", e),
                }
            }
        })
    }
}
