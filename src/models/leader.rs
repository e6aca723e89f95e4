//! Ranked trader statistics and the per-leader copy configuration derived
//! from them.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Opaque on-chain account identifier.
pub type AccountIndex = u64;

/// Metrics snapshot for one account, produced once per ranking cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderStats {
    /// Display name assigned at selection time
    #[serde(default)]
    pub name: String,

    pub account_index: AccountIndex,

    /// L1 wallet address (may be empty if the API did not report one)
    #[serde(default)]
    pub l1_address: String,

    /// Total account value in USDC
    pub equity: Decimal,

    pub pnl_7d_pct: Option<f64>,
    pub pnl_30d_pct: Option<f64>,
    pub win_rate_pct: Option<f64>,
    pub trades_7d: Option<u32>,
    pub max_drawdown_30d_pct: Option<f64>,
    pub sharpe_30d: Option<f64>,
}

impl TraderStats {
    /// Stats with only an equity snapshot, no trading metrics.
    pub fn equity_only(account_index: AccountIndex, l1_address: String, equity: Decimal) -> Self {
        Self {
            name: String::new(),
            account_index,
            l1_address,
            equity,
            pnl_7d_pct: None,
            pnl_30d_pct: None,
            win_rate_pct: None,
            trades_7d: None,
            max_drawdown_30d_pct: None,
            sharpe_30d: None,
        }
    }

    /// Shortened address (or account fallback) used in display names.
    pub fn short_label(&self) -> String {
        let addr = &self.l1_address;
        if addr.is_empty() {
            format!("acct{}", self.account_index)
        } else if addr.len() > 10 && addr.is_ascii() {
            format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
        } else {
            addr.clone()
        }
    }

    pub fn equity_f64(&self) -> f64 {
        self.equity.to_f64().unwrap_or(0.0)
    }
}

/// How a follower sizes a copied position change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Scale the leader's quantity change by `copy_param`.
    #[serde(alias = "risk", alias = "mirror")]
    Proportional,
    /// Always trade `copy_param` base units.
    Fixed,
}

impl std::fmt::Display for CopyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyMode::Proportional => write!(f, "proportional"),
            CopyMode::Fixed => write!(f, "fixed"),
        }
    }
}

/// Static copy parameters applied to every discovered leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyDefaults {
    /// Markets we are willing to copy; empty means all
    pub markets_allow: Vec<String>,
    pub copy_mode: CopyMode,
    pub copy_param: Decimal,
    pub slippage_bps: u32,
    pub max_leverage: Decimal,
    pub max_positions: u32,
}

impl Default for CopyDefaults {
    fn default() -> Self {
        Self {
            markets_allow: Vec::new(),
            copy_mode: CopyMode::Proportional,
            copy_param: dec!(0.5),
            slippage_bps: 20,
            max_leverage: dec!(5),
            max_positions: 3,
        }
    }
}

/// Copy configuration for a single leader.
///
/// Leader sets are replaced wholesale on refresh; individual configs are
/// never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderConfig {
    pub name: String,
    #[serde(default)]
    pub l1_address: String,
    pub account_index: AccountIndex,
    #[serde(default)]
    pub markets_allow: Vec<String>,
    #[serde(default = "default_copy_mode")]
    pub copy_mode: CopyMode,
    #[serde(default = "default_copy_param")]
    pub copy_param: Decimal,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: Decimal,
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_copy_mode() -> CopyMode {
    CopyDefaults::default().copy_mode
}

fn default_copy_param() -> Decimal {
    CopyDefaults::default().copy_param
}

fn default_slippage_bps() -> u32 {
    CopyDefaults::default().slippage_bps
}

fn default_max_leverage() -> Decimal {
    CopyDefaults::default().max_leverage
}

fn default_max_positions() -> u32 {
    CopyDefaults::default().max_positions
}

fn default_enabled() -> bool {
    true
}

impl LeaderConfig {
    /// Derive a leader's configuration from its ranking stats.
    pub fn from_stats(stats: &TraderStats, defaults: &CopyDefaults) -> Self {
        let name = if stats.name.is_empty() {
            stats.short_label()
        } else {
            stats.name.clone()
        };

        Self {
            name,
            l1_address: stats.l1_address.clone(),
            account_index: stats.account_index,
            markets_allow: defaults.markets_allow.clone(),
            copy_mode: defaults.copy_mode,
            copy_param: defaults.copy_param,
            slippage_bps: defaults.slippage_bps,
            max_leverage: defaults.max_leverage,
            max_positions: defaults.max_positions,
            enabled: true,
        }
    }

    /// Whether this leader's trades in `market` may be copied.
    pub fn allows_market(&self, market: &str) -> bool {
        self.markets_allow.is_empty()
            || self
                .markets_allow
                .iter()
                .any(|m| m.eq_ignore_ascii_case(market))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(l1: &str) -> TraderStats {
        TraderStats::equity_only(17, l1.to_string(), dec!(250))
    }

    #[test]
    fn test_short_label() {
        assert_eq!(
            stats("0x1234567890abcdef1234").short_label(),
            "0x1234...1234"
        );
        assert_eq!(stats("").short_label(), "acct17");
        assert_eq!(stats("0xabc").short_label(), "0xabc");
    }

    #[test]
    fn test_from_stats_applies_defaults() {
        let mut s = stats("0x1234567890abcdef1234");
        s.name = "leader1-0x1234...1234".to_string();
        let defaults = CopyDefaults {
            markets_allow: vec!["BTC".to_string()],
            ..Default::default()
        };

        let cfg = LeaderConfig::from_stats(&s, &defaults);
        assert_eq!(cfg.name, "leader1-0x1234...1234");
        assert_eq!(cfg.account_index, 17);
        assert_eq!(cfg.copy_param, dec!(0.5));
        assert!(cfg.enabled);
        assert!(cfg.allows_market("btc"));
        assert!(!cfg.allows_market("ETH"));
    }

    #[test]
    fn test_copy_mode_aliases() {
        let mode: CopyMode = serde_json::from_str("\"risk\"").unwrap();
        assert_eq!(mode, CopyMode::Proportional);
        let mode: CopyMode = serde_json::from_str("\"fixed\"").unwrap();
        assert_eq!(mode, CopyMode::Fixed);
    }

    #[test]
    fn test_leader_config_minimal_json() {
        let cfg: LeaderConfig =
            serde_json::from_str(r#"{ "name": "whale", "account_index": 5 }"#).unwrap();
        assert!(cfg.enabled);
        assert!(cfg.markets_allow.is_empty());
        assert_eq!(cfg.slippage_bps, 20);
    }
}
