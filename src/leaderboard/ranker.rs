//! Scores discovered accounts and selects a ranked leader set.
//!
//! Selection runs an ordered list of filter policies and keeps the first one
//! that leaves any candidate:
//! 1. strict thresholds from configuration,
//! 2. relaxed thresholds (any non-negative equity, any activity, any drawdown),
//! 3. if no account could be scored at all, plain equity snapshots under the
//!    relaxed thresholds.
//!
//! This keeps the pipeline producing leaders whenever the chain shows any
//! activity, at the cost of ranking precision when data is sparse.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{extract, AccountLookup, ChainApi, ChainApiError, RateLimitedClient};
use crate::models::{AccountIndex, TraderStats};

/// Metric used to order eligible candidates, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[serde(rename = "sharpe_30d")]
    Sharpe30d,
    #[serde(rename = "pnl_7d_pct")]
    Pnl7dPct,
    #[serde(rename = "pnl_30d_pct")]
    Pnl30dPct,
    WinRatePct,
    #[serde(rename = "trades_7d")]
    Trades7d,
    Equity,
}

impl SortKey {
    pub fn metric(&self, stats: &TraderStats) -> Option<f64> {
        match self {
            SortKey::Sharpe30d => stats.sharpe_30d,
            SortKey::Pnl7dPct => stats.pnl_7d_pct,
            SortKey::Pnl30dPct => stats.pnl_30d_pct,
            SortKey::WinRatePct => stats.win_rate_pct,
            SortKey::Trades7d => stats.trades_7d.map(f64::from),
            SortKey::Equity => Some(stats.equity_f64()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Sharpe30d => "sharpe_30d",
            SortKey::Pnl7dPct => "pnl_7d_pct",
            SortKey::Pnl30dPct => "pnl_30d_pct",
            SortKey::WinRatePct => "win_rate_pct",
            SortKey::Trades7d => "trades_7d",
            SortKey::Equity => "equity",
        }
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sharpe_30d" | "sharpe" => Ok(SortKey::Sharpe30d),
            "pnl_7d_pct" | "pnl7d" => Ok(SortKey::Pnl7dPct),
            "pnl_30d_pct" | "pnl30d" => Ok(SortKey::Pnl30dPct),
            "win_rate" | "win_rate_pct" => Ok(SortKey::WinRatePct),
            "trades_7d" => Ok(SortKey::Trades7d),
            "equity" | "equity_usdc" => Ok(SortKey::Equity),
            other => anyhow::bail!("unknown sort key: {}", other),
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to a selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionParams {
    /// Number of leaders to return
    pub n: usize,
    pub min_equity: Decimal,
    pub min_trades_7d: u32,
    pub max_drawdown_30d_pct: f64,
    pub sort_by: SortKey,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            n: 3,
            min_equity: dec!(50),
            min_trades_7d: 5,
            max_drawdown_30d_pct: 35.0,
            sort_by: SortKey::Sharpe30d,
        }
    }
}

impl SelectionParams {
    /// Permissive selection used to seed leaders when configured thresholds
    /// find nobody.
    pub fn seed() -> Self {
        let relaxed = FilterPolicy::relaxed();
        Self {
            n: 3,
            min_equity: relaxed.min_equity,
            min_trades_7d: relaxed.min_trades_7d,
            max_drawdown_30d_pct: relaxed.max_drawdown_30d_pct,
            sort_by: SortKey::Equity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingTier {
    Strict,
    Relaxed,
    EquityOnly,
}

/// One eligibility tier.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPolicy {
    pub tier: RankingTier,
    pub min_equity: Decimal,
    pub min_trades_7d: u32,
    pub max_drawdown_30d_pct: f64,
}

impl FilterPolicy {
    pub fn strict(params: &SelectionParams) -> Self {
        Self {
            tier: RankingTier::Strict,
            min_equity: params.min_equity,
            min_trades_7d: params.min_trades_7d,
            max_drawdown_30d_pct: params.max_drawdown_30d_pct,
        }
    }

    pub fn relaxed() -> Self {
        Self {
            tier: RankingTier::Relaxed,
            min_equity: Decimal::ZERO,
            min_trades_7d: 0,
            max_drawdown_30d_pct: 10_000.0,
        }
    }

    /// Missing metrics count as zero.
    pub fn accepts(&self, stats: &TraderStats) -> bool {
        stats.equity >= self.min_equity
            && stats.trades_7d.unwrap_or(0) >= self.min_trades_7d
            && stats.max_drawdown_30d_pct.unwrap_or(0.0) <= self.max_drawdown_30d_pct
    }

    pub fn apply(&self, rows: &[TraderStats]) -> Vec<TraderStats> {
        rows.iter().filter(|s| self.accepts(s)).cloned().collect()
    }
}

/// First policy in `policies` that leaves a non-empty result.
pub fn first_nonempty(
    rows: &[TraderStats],
    policies: &[FilterPolicy],
) -> Option<(RankingTier, Vec<TraderStats>)> {
    policies.iter().find_map(|policy| {
        let kept = policy.apply(rows);
        debug!(tier = ?policy.tier, kept = kept.len(), of = rows.len(), "Applied filter policy");
        (!kept.is_empty()).then_some((policy.tier, kept))
    })
}

/// Sort descending by `sort_by`, keep `n`, and assign display names.
///
/// Falls back to equity ordering when no candidate reports the metric.
pub fn rank(mut rows: Vec<TraderStats>, n: usize, sort_by: SortKey) -> Vec<TraderStats> {
    let key = if rows.iter().any(|s| sort_by.metric(s).is_some()) {
        sort_by
    } else {
        SortKey::Equity
    };

    rows.sort_by(|a, b| {
        let ma = key.metric(a).unwrap_or(0.0);
        let mb = key.metric(b).unwrap_or(0.0);
        mb.partial_cmp(&ma).unwrap_or(Ordering::Equal)
    });
    rows.truncate(n);

    for (i, stats) in rows.iter_mut().enumerate() {
        if stats.name.is_empty() {
            stats.name = format!("leader{}-{}", i + 1, stats.short_label());
        }
    }
    rows
}

/// Fetches per-account metrics and applies the tiered selection.
pub struct LeaderRanker {
    api: Arc<dyn ChainApi>,
    limiter: Arc<RateLimitedClient>,
    max_accounts: usize,
}

impl LeaderRanker {
    pub fn new(api: Arc<dyn ChainApi>, limiter: Arc<RateLimitedClient>, max_accounts: usize) -> Self {
        Self {
            api,
            limiter,
            max_accounts,
        }
    }

    /// Rank `account_indices` and return at most `params.n` leaders.
    ///
    /// Accounts whose data cannot be fetched are skipped; this never fails
    /// as a whole.
    pub async fn score_and_select(
        &self,
        account_indices: &[AccountIndex],
        params: &SelectionParams,
    ) -> Vec<TraderStats> {
        if account_indices.is_empty() || params.n == 0 {
            return Vec::new();
        }

        let candidates = &account_indices[..account_indices.len().min(self.max_accounts)];
        let scored = self.score_accounts(candidates).await;

        let selected = if scored.is_empty() {
            warn!(
                candidates = candidates.len(),
                "No account could be scored, ranking by equity"
            );
            let basics = self.equity_snapshots(candidates).await;
            let kept = FilterPolicy::relaxed().apply(&basics);
            (!kept.is_empty()).then_some((RankingTier::EquityOnly, kept))
        } else {
            first_nonempty(&scored, &[FilterPolicy::strict(params), FilterPolicy::relaxed()])
        };

        let Some((tier, pool)) = selected else {
            info!(candidates = candidates.len(), "No eligible leaders");
            return Vec::new();
        };

        let leaders = rank(pool, params.n, params.sort_by);
        info!(
            tier = ?tier,
            sort_by = %params.sort_by,
            selected = leaders.len(),
            "Selected leaders"
        );
        leaders
    }

    async fn score_accounts(&self, indices: &[AccountIndex]) -> Vec<TraderStats> {
        let mut scored = Vec::with_capacity(indices.len());

        for &idx in indices {
            match self.score_account(idx).await {
                Ok(stats) => scored.push(stats),
                Err(e) => {
                    debug!(account_index = idx, error = %e, "Skipping account without stats");
                }
            }
        }

        scored
    }

    async fn score_account(&self, idx: AccountIndex) -> Result<TraderStats, ChainApiError> {
        let api = &self.api;
        let pnl = self.limiter.call("account_pnl", || api.account_pnl(idx)).await?;
        let metrics = extract::pnl_metrics(&pnl);

        let lookup = AccountLookup::Index(idx);
        let account = self
            .limiter
            .call("account", || api.account_snapshot(&lookup))
            .await?;
        let basics = extract::account_basics(&account);

        Ok(TraderStats {
            name: String::new(),
            account_index: idx,
            l1_address: basics.l1_address,
            equity: basics.equity,
            pnl_7d_pct: metrics.pnl_7d_pct,
            pnl_30d_pct: metrics.pnl_30d_pct,
            win_rate_pct: metrics.win_rate_pct,
            trades_7d: metrics.trades_7d,
            max_drawdown_30d_pct: metrics.max_drawdown_30d_pct,
            sharpe_30d: metrics.sharpe_30d,
        })
    }

    async fn equity_snapshots(&self, indices: &[AccountIndex]) -> Vec<TraderStats> {
        let api = &self.api;
        let mut basics = Vec::with_capacity(indices.len());

        for &idx in indices {
            let lookup = AccountLookup::Index(idx);
            match self
                .limiter
                .call("account", || api.account_snapshot(&lookup))
                .await
            {
                Ok(account) => {
                    let b = extract::account_basics(&account);
                    basics.push(TraderStats::equity_only(idx, b.l1_address, b.equity));
                }
                Err(e) => {
                    debug!(account_index = idx, error = %e, "Skipping account without snapshot");
                }
            }
        }

        basics
    }
}
