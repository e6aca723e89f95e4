//! Periodic snapshot fetch and diff for every followed leader.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::api::{extract, AccountLookup, ChainApi, ChainApiError, RateLimitedClient};
use crate::leaderboard::LeaderSource;
use crate::models::{AccountIndex, LeaderConfig, PositionSnapshot, Signal};

use super::diff::{diff, LeaderContext};

/// Holds the last snapshot per leader and turns each new one into signals.
pub struct LeaderPoller {
    api: Arc<dyn ChainApi>,
    limiter: Arc<RateLimitedClient>,
    source: Arc<dyn LeaderSource>,
    snapshots: HashMap<AccountIndex, PositionSnapshot>,
}

impl LeaderPoller {
    pub fn new(
        api: Arc<dyn ChainApi>,
        limiter: Arc<RateLimitedClient>,
        source: Arc<dyn LeaderSource>,
    ) -> Self {
        Self {
            api,
            limiter,
            source,
            snapshots: HashMap::new(),
        }
    }

    /// One poll cycle over the current leader set.
    ///
    /// Signals are returned in leader order. A leader whose snapshot cannot
    /// be fetched is logged and skipped, and its stored snapshot is kept.
    /// Snapshots of leaders no longer followed are dropped, so a leader that
    /// returns later starts silent again.
    pub async fn tick(&mut self) -> Result<Vec<Signal>> {
        let leaders = self
            .source
            .leaders()
            .await
            .context("Failed to obtain leader set")?;

        let mut signals = Vec::new();
        let observed_at = Utc::now();

        for leader in leaders.iter().filter(|l| l.enabled) {
            let curr = match self.fetch_snapshot(leader).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(
                        leader = %leader.name,
                        account_index = leader.account_index,
                        error = %e,
                        "Snapshot fetch failed"
                    );
                    continue;
                }
            };

            let ctx = LeaderContext {
                name: leader.name.clone(),
                account_index: leader.account_index,
                l1_address: leader.l1_address.clone(),
                observed_at,
            };
            let prev = self.snapshots.get(&leader.account_index);
            let changes = diff(prev, &curr, &ctx);

            if prev.is_none() {
                debug!(leader = %leader.name, markets = curr.len(), "First snapshot stored");
            }
            if !changes.is_empty() {
                debug!(leader = %leader.name, signals = changes.len(), "Position changes detected");
            }

            signals.extend(changes);
            self.snapshots.insert(leader.account_index, curr);
        }

        let followed: HashSet<AccountIndex> = leaders
            .iter()
            .filter(|l| l.enabled)
            .map(|l| l.account_index)
            .collect();
        self.snapshots.retain(|idx, _| followed.contains(idx));

        Ok(signals)
    }

    #[cfg(test)]
    pub fn snapshot(&self, account_index: AccountIndex) -> Option<&PositionSnapshot> {
        self.snapshots.get(&account_index)
    }

    async fn fetch_snapshot(&self, leader: &LeaderConfig) -> Result<PositionSnapshot, ChainApiError> {
        let api = &self.api;
        let lookup = AccountLookup::Index(leader.account_index);
        let payload = self
            .limiter
            .call("account", || api.account_snapshot(&lookup))
            .await?;
        Ok(extract::positions(&payload))
    }
}
