//! Copy configuration file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::RetryPolicy;
use crate::leaderboard::{SelectionParams, SortKey};
use crate::models::{CopyDefaults, LeaderConfig};

/// Eligibility thresholds for discovered leaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub min_equity_usdc: Decimal,
    pub min_trades_7d: u32,
    pub max_drawdown_30d_pct: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_equity_usdc: dec!(50),
            min_trades_7d: 5,
            max_drawdown_30d_pct: 35.0,
        }
    }
}

/// Discovery and ranking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Blocks to scan back from the chain head
    pub lookback_blocks: u64,

    /// Cap on distinct accounts scanned and scored
    pub max_accounts: usize,

    /// Chain API requests per second
    pub rps: f64,

    /// Seconds between leader set refreshes
    pub refresh_sec: u64,

    /// Number of leaders followed
    pub follow_slots: usize,

    pub sort_by: String,

    pub selection: SelectionConfig,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            lookback_blocks: 200,
            max_accounts: 100,
            rps: 1.0,
            refresh_sec: 30,
            follow_slots: 3,
            sort_by: "sharpe_30d".to_string(),
            selection: SelectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_sec: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_sec: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_tries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_tries: 5,
            base_delay_ms: 500,
        }
    }
}

/// Top-level copy configuration. Every field has a default, so an empty
/// JSON object is a valid file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    pub leaderboard: LeaderboardConfig,
    pub poll: PollConfig,
    pub copy_defaults: CopyDefaults,

    /// Fixed leaders; when non-empty, discovery is skipped
    pub leaders: Vec<LeaderConfig>,

    /// Follower account whose equity sizes decisions
    pub follower_account_index: Option<u64>,

    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            leaderboard: LeaderboardConfig::default(),
            poll: PollConfig::default(),
            copy_defaults: CopyDefaults::default(),
            leaders: Vec::new(),
            follower_account_index: None,
            request_timeout_secs: 15,
            retry: RetryConfig::default(),
        }
    }
}

impl CopyConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn selection(&self) -> SelectionParams {
        let lb = &self.leaderboard;
        let sort_by = lb.sort_by.parse::<SortKey>().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to equity ordering");
            SortKey::Equity
        });

        SelectionParams {
            n: lb.follow_slots,
            min_equity: lb.selection.min_equity_usdc,
            min_trades_7d: lb.selection.min_trades_7d,
            max_drawdown_30d_pct: lb.selection.max_drawdown_30d_pct,
            sort_by,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_tries: self.retry.max_tries.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.leaderboard.refresh_sec)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_sec.max(1))
    }
}
