//! Discovers active accounts by walking recent blocks.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{extract, ChainApi, ChainApiError, RateLimitedClient};
use crate::models::AccountIndex;

/// Walks blocks newest-to-oldest and tallies transaction senders.
pub struct ChainScanner {
    api: Arc<dyn ChainApi>,
    limiter: Arc<RateLimitedClient>,
}

impl ChainScanner {
    pub fn new(api: Arc<dyn ChainApi>, limiter: Arc<RateLimitedClient>) -> Self {
        Self { api, limiter }
    }

    /// Accounts seen in the last `lookback_blocks` blocks, most active first.
    ///
    /// Scanning stops early once `max_accounts` distinct accounts have been
    /// observed. A block that cannot be fetched is skipped; only a failure to
    /// read the chain height is returned as an error.
    pub async fn discover_active_accounts(
        &self,
        lookback_blocks: u64,
        max_accounts: usize,
    ) -> Result<Vec<AccountIndex>, ChainApiError> {
        let api = &self.api;
        let height = match self
            .limiter
            .call("current_height", || api.current_height())
            .await
        {
            Ok(h) => h,
            Err(ChainApiError::NotFound(_)) | Err(ChainApiError::DataShape(_)) => {
                warn!("No chain height available");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if height == 0 || max_accounts == 0 {
            return Ok(Vec::new());
        }

        let oldest = height.saturating_sub(lookback_blocks).max(1);
        let mut counts: HashMap<AccountIndex, u64> = HashMap::new();
        // First-seen order breaks ties between equally active accounts
        let mut first_seen: Vec<AccountIndex> = Vec::new();
        let mut scanned = 0u64;

        for block in (oldest..=height).rev() {
            if scanned >= lookback_blocks {
                break;
            }
            scanned += 1;

            let txs = match self
                .limiter
                .call("block_txs", || api.block_transactions(block))
                .await
            {
                Ok(txs) => txs,
                Err(e) => {
                    warn!(block = block, error = %e, "Skipping block");
                    continue;
                }
            };

            for tx in &txs {
                let Some(idx) = extract::tx_account_index(tx) else {
                    continue;
                };
                let count = counts.entry(idx).or_insert(0);
                if *count == 0 {
                    first_seen.push(idx);
                }
                *count += 1;
            }

            if counts.len() >= max_accounts {
                debug!(block = block, accounts = counts.len(), "Account budget reached");
                break;
            }
        }

        let mut ranked: Vec<(usize, AccountIndex)> =
            first_seen.iter().copied().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| counts[b].cmp(&counts[a]).then(ia.cmp(ib)));

        let accounts: Vec<AccountIndex> = ranked
            .into_iter()
            .map(|(_, idx)| idx)
            .take(max_accounts)
            .collect();

        info!(
            height = height,
            blocks = scanned,
            accounts = accounts.len(),
            "Scanned recent blocks"
        );

        Ok(accounts)
    }
}
