//! Leader sources: a fixed configured list, or on-chain discovery behind a
//! refresh cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ChainApiError;
use crate::models::{CopyDefaults, LeaderConfig, TraderStats};

use super::{ChainScanner, LeaderRanker, SelectionParams};

/// Anything that can hand the poller its current leader set.
#[async_trait]
pub trait LeaderSource: Send + Sync {
    /// Leader set for the next poll, refreshing if the source caches.
    async fn leaders(&self) -> Result<Arc<Vec<LeaderConfig>>>;

    /// Last known leader set, never refreshing.
    async fn current(&self) -> Arc<Vec<LeaderConfig>>;
}

/// Leaders pinned in configuration. Disabled entries are dropped up front.
pub struct StaticLeaders {
    leaders: Arc<Vec<LeaderConfig>>,
}

impl StaticLeaders {
    pub fn new(leaders: Vec<LeaderConfig>) -> Self {
        let leaders: Vec<LeaderConfig> = leaders.into_iter().filter(|l| l.enabled).collect();
        Self {
            leaders: Arc::new(leaders),
        }
    }
}

#[async_trait]
impl LeaderSource for StaticLeaders {
    async fn leaders(&self) -> Result<Arc<Vec<LeaderConfig>>> {
        Ok(self.leaders.clone())
    }

    async fn current(&self) -> Arc<Vec<LeaderConfig>> {
        self.leaders.clone()
    }
}

/// Scan followed by rank.
pub struct LeaderDiscovery {
    scanner: ChainScanner,
    ranker: LeaderRanker,
    lookback_blocks: u64,
    max_accounts: usize,
}

impl LeaderDiscovery {
    pub fn new(
        scanner: ChainScanner,
        ranker: LeaderRanker,
        lookback_blocks: u64,
        max_accounts: usize,
    ) -> Self {
        Self {
            scanner,
            ranker,
            lookback_blocks,
            max_accounts,
        }
    }

    pub async fn top_n(&self, params: &SelectionParams) -> Result<Vec<TraderStats>, ChainApiError> {
        let accounts = self
            .scanner
            .discover_active_accounts(self.lookback_blocks, self.max_accounts)
            .await?;

        if accounts.is_empty() {
            info!("No active accounts found");
            return Ok(Vec::new());
        }

        Ok(self.ranker.score_and_select(&accounts, params).await)
    }
}

/// Cached leader set with the instant it was last refreshed.
#[derive(Debug, Clone, Default)]
pub struct LeaderCache {
    pub refreshed_at: Option<Instant>,
    pub leaders: Arc<Vec<LeaderConfig>>,
}

impl LeaderCache {
    fn is_stale(&self, refresh_every: Duration) -> bool {
        match self.refreshed_at {
            None => true,
            Some(_) if self.leaders.is_empty() => true,
            Some(at) => at.elapsed() >= refresh_every,
        }
    }
}

/// Discovery-backed leader source refreshed at most once per interval.
///
/// The cache sits behind a short-held lock and is swapped as a whole once a
/// refresh completes, so readers keep seeing the previous set meanwhile.
/// Refreshes themselves are serialized on `refreshing`: a second caller waits
/// and then reads the fresh set.
pub struct LeaderProvider {
    discovery: LeaderDiscovery,
    params: SelectionParams,
    defaults: CopyDefaults,
    refresh_every: Duration,
    cache: RwLock<LeaderCache>,
    refreshing: Mutex<()>,
}

impl LeaderProvider {
    pub fn new(
        discovery: LeaderDiscovery,
        params: SelectionParams,
        defaults: CopyDefaults,
        refresh_every: Duration,
    ) -> Self {
        Self {
            discovery,
            params,
            defaults,
            refresh_every,
            cache: RwLock::new(LeaderCache::default()),
            refreshing: Mutex::new(()),
        }
    }

    /// Cached leaders, refreshing first when the cache is stale or empty.
    ///
    /// A failed or empty refresh keeps serving the previous set.
    pub async fn provide_leaders(&self) -> Arc<Vec<LeaderConfig>> {
        if let Some(leaders) = self.fresh_leaders().await {
            return leaders;
        }

        let _refreshing = self.refreshing.lock().await;
        // another caller may have refreshed while we waited
        if let Some(leaders) = self.fresh_leaders().await {
            return leaders;
        }

        let previous = self.current().await;
        let leaders = match self.refresh().await {
            Ok(fresh) if !fresh.is_empty() => {
                info!(leaders = fresh.len(), "Leader set refreshed");
                Arc::new(fresh)
            }
            Ok(_) => {
                warn!(
                    keeping = previous.len(),
                    "Refresh found no leaders, keeping previous set"
                );
                previous
            }
            Err(e) => {
                warn!(
                    error = %e,
                    keeping = previous.len(),
                    "Leader refresh failed, keeping previous set"
                );
                previous
            }
        };

        *self.cache.write().await = LeaderCache {
            refreshed_at: Some(Instant::now()),
            leaders: leaders.clone(),
        };
        leaders
    }

    /// Cached leaders without triggering a refresh. Never waits on one.
    pub async fn current(&self) -> Arc<Vec<LeaderConfig>> {
        self.cache.read().await.leaders.clone()
    }

    async fn fresh_leaders(&self) -> Option<Arc<Vec<LeaderConfig>>> {
        let cache = self.cache.read().await;
        (!cache.is_stale(self.refresh_every)).then(|| cache.leaders.clone())
    }

    async fn refresh(&self) -> Result<Vec<LeaderConfig>, ChainApiError> {
        let mut top = self.discovery.top_n(&self.params).await?;

        if top.is_empty() {
            debug!("Configured selection found nobody, reseeding with relaxed defaults");
            top = self.discovery.top_n(&SelectionParams::seed()).await?;
        }

        Ok(top
            .iter()
            .map(|stats| LeaderConfig::from_stats(stats, &self.defaults))
            .collect())
    }
}

#[async_trait]
impl LeaderSource for LeaderProvider {
    async fn leaders(&self) -> Result<Arc<Vec<LeaderConfig>>> {
        Ok(self.provide_leaders().await)
    }

    async fn current(&self) -> Arc<Vec<LeaderConfig>> {
        LeaderProvider::current(self).await
    }
}
