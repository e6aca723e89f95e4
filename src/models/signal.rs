//! Copy signals emitted when a leader's position changes.

use alloy_primitives::keccak256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AccountIndex;

/// Direction of the leader's quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSide {
    Buy,
    Sell,
}

impl SignalSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSide::Buy => "BUY",
            SignalSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            SignalSide::Buy => SignalSide::Sell,
            SignalSide::Sell => SignalSide::Buy,
        }
    }
}

impl std::fmt::Display for SignalSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Open,
    Close,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Open => f.write_str("OPEN"),
            SignalType::Close => f.write_str("CLOSE"),
        }
    }
}

/// A detected OPEN or CLOSE on a leader's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub leader: String,
    pub leader_account_index: AccountIndex,
    pub leader_l1: String,
    pub market: String,
    pub side: SignalSide,
    /// Reference price, when the source reports one
    pub price: Option<f64>,
    /// Absolute quantity change in base units
    pub size: f64,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    /// Deduplication key, unique per (leader, market, side, ts)
    pub client_ref: String,
    pub ts: DateTime<Utc>,
}

/// Stable 24-hex-char reference for downstream deduplication.
pub fn client_ref(leader: &str, market: &str, side: SignalSide, ts: DateTime<Utc>, tag: &str) -> String {
    let raw = format!(
        "{}|{}|{}|{}|{}",
        leader,
        market,
        side,
        ts.timestamp_micros(),
        tag
    );
    let digest = keccak256(raw.as_bytes());
    let mut id = hex::encode(digest.as_slice());
    id.truncate(24);
    id
}
