//! Schema-tolerant field extraction from chain API payloads.
//!
//! The chain API is not consistent about field names or nesting. Each
//! logical field is described by an ordered list of candidate paths; the first
//! path that resolves to a usable value wins. Keeping the lists as data makes
//! the precedence explicit and testable.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::models::{AccountIndex, PositionSnapshot};

/// One candidate location of a field, as a sequence of object keys.
/// Numeric segments index into arrays.
pub type FieldPath = &'static [&'static str];

pub const HEIGHT: &[FieldPath] = &[&["height"], &["current_height"], &["block_height"]];

pub const BLOCK_TXS: &[FieldPath] = &[&["txs"], &["transactions"], &["data", "txs"]];

pub const TX_ACCOUNT_INDEX: &[FieldPath] = &[
    &["account_index"],
    &["accountIndex"],
    &["by_account"],
    &["tx", "account_index"],
    &["tx", "by_account"],
];

pub const ACCOUNT_ROOT: &[FieldPath] = &[&["account"], &["accounts", "0"]];

pub const EQUITY: &[FieldPath] = &[&["total_asset_value"], &["collateral"]];

pub const L1_ADDRESS: &[FieldPath] = &[&["l1_address"], &["l1Address"]];

pub const POSITIONS: &[FieldPath] = &[&["positions"], &["openPositions"]];

pub const POSITION_MARKET: &[FieldPath] = &[&["symbol"], &["market"]];

pub const POSITION_QTY: &[FieldPath] = &[&["position"], &["qty"], &["size"]];

pub const POSITION_SIGN: &[FieldPath] = &[&["sign"]];

pub const PNL_7D_PCT: &[FieldPath] = &[&["pnl_7d_pct"], &["pnl7d"]];
pub const PNL_30D_PCT: &[FieldPath] = &[&["pnl_30d_pct"], &["pnl30d"]];
pub const WIN_RATE_PCT: &[FieldPath] = &[&["win_rate_pct"], &["winRate"]];
pub const TRADES_7D: &[FieldPath] = &[&["trades_7d"], &["trades7d"]];
pub const MAX_DRAWDOWN_30D_PCT: &[FieldPath] = &[&["max_drawdown_30d_pct"], &["dd30d"]];
pub const SHARPE_30D: &[FieldPath] = &[&["sharpe_30d"], &["sharpe30d"]];

/// Resolve a single path against a value.
pub fn lookup<'a>(value: &'a Value, path: FieldPath) -> Option<&'a Value> {
    path.iter().try_fold(value, |cur, key| match cur {
        Value::Object(map) => map.get(*key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// First candidate that resolves to a non-null value.
pub fn first<'a>(value: &'a Value, candidates: &[FieldPath]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|v| !v.is_null())
}

/// First candidate that parses as a float (JSON number or numeric string).
pub fn first_f64(value: &Value, candidates: &[FieldPath]) -> Option<f64> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(as_f64)
}

pub fn first_u64(value: &Value, candidates: &[FieldPath]) -> Option<u64> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(as_u64)
}

pub fn first_str<'a>(value: &'a Value, candidates: &[FieldPath]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
}

pub fn first_decimal(value: &Value, candidates: &[FieldPath]) -> Option<Decimal> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(as_decimal)
}

pub fn as_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

pub fn as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n
            .as_f64()
            .and_then(|f| Decimal::try_from(f).ok()),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Chain height from a `currentHeight` payload (or a bare number).
pub fn height(payload: &Value) -> Option<u64> {
    as_u64(payload).or_else(|| first_u64(payload, HEIGHT))
}

/// Transaction list of a block payload; empty when none can be found.
pub fn block_transactions(payload: &Value) -> Vec<Value> {
    if let Value::Array(items) = payload {
        return items.clone();
    }
    first(payload, BLOCK_TXS)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Acting account of a raw transaction.
pub fn tx_account_index(tx: &Value) -> Option<AccountIndex> {
    first_u64(tx, TX_ACCOUNT_INDEX)
}

/// Account object inside an account payload, or the payload itself.
pub fn account_root(payload: &Value) -> &Value {
    first(payload, ACCOUNT_ROOT)
        .filter(|v| v.is_object())
        .unwrap_or(payload)
}

/// Equity and L1 address of an account payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBasics {
    pub equity: Decimal,
    pub l1_address: String,
}

pub fn account_basics(payload: &Value) -> AccountBasics {
    let root = account_root(payload);
    AccountBasics {
        equity: first_decimal(root, EQUITY).unwrap_or(Decimal::ZERO),
        l1_address: first_str(root, L1_ADDRESS).unwrap_or_default().to_string(),
    }
}

/// Signed quantity of one raw position, or `None` if it has no usable size.
pub fn position_quantity(position: &Value) -> Option<f64> {
    let qty = first_f64(position, POSITION_QTY)?;
    let negative = first_f64(position, POSITION_SIGN).is_some_and(|s| s < 0.0);
    Some(if negative { -qty.abs() } else { qty })
}

/// Market-to-quantity snapshot of an account payload.
///
/// Entries without a market or a parsable quantity are skipped.
pub fn positions(payload: &Value) -> PositionSnapshot {
    let root = account_root(payload);
    let Some(items) = first(root, POSITIONS).and_then(Value::as_array) else {
        return PositionSnapshot::default();
    };

    items
        .iter()
        .filter_map(|p| {
            let market = first_str(p, POSITION_MARKET)?;
            let qty = position_quantity(p)?;
            Some((market.to_string(), qty))
        })
        .collect()
}

/// Trading metrics from a PnL payload. Missing metrics stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PnlMetrics {
    pub pnl_7d_pct: Option<f64>,
    pub pnl_30d_pct: Option<f64>,
    pub win_rate_pct: Option<f64>,
    pub trades_7d: Option<u32>,
    pub max_drawdown_30d_pct: Option<f64>,
    pub sharpe_30d: Option<f64>,
}

pub fn pnl_metrics(payload: &Value) -> PnlMetrics {
    PnlMetrics {
        pnl_7d_pct: first_f64(payload, PNL_7D_PCT),
        pnl_30d_pct: first_f64(payload, PNL_30D_PCT),
        win_rate_pct: first_f64(payload, WIN_RATE_PCT),
        trades_7d: first_u64(payload, TRADES_7D).map(|t| t.min(u32::MAX as u64) as u32),
        max_drawdown_30d_pct: first_f64(payload, MAX_DRAWDOWN_30D_PCT),
        sharpe_30d: first_f64(payload, SHARPE_30D),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_candidate_precedence() {
        let tx = json!({ "by_account": 7, "accountIndex": 3 });
        assert_eq!(tx_account_index(&tx), Some(3));

        let nested = json!({ "tx": { "by_account": "42" } });
        assert_eq!(tx_account_index(&nested), Some(42));

        let missing = json!({ "hash": "0xabc" });
        assert_eq!(tx_account_index(&missing), None);
    }

    #[test]
    fn test_null_falls_through() {
        let tx = json!({ "account_index": null, "by_account": 9 });
        assert_eq!(tx_account_index(&tx), Some(9));
    }

    #[test]
    fn test_height_shapes() {
        assert_eq!(height(&json!({ "height": 1200 })), Some(1200));
        assert_eq!(height(&json!(77)), Some(77));
        assert_eq!(height(&json!({ "code": 200 })), None);
    }

    #[test]
    fn test_block_transactions_shapes() {
        assert_eq!(block_transactions(&json!({ "txs": [{}, {}] })).len(), 2);
        assert_eq!(block_transactions(&json!({ "transactions": [{}] })).len(), 1);
        assert_eq!(block_transactions(&json!([{}, {}, {}])).len(), 3);
        assert!(block_transactions(&json!({ "txs": null })).is_empty());
    }

    #[test]
    fn test_account_basics_nested() {
        let payload = json!({
            "accounts": [{ "l1_address": "0xabc", "collateral": "125.5" }]
        });
        let basics = account_basics(&payload);
        assert_eq!(basics.equity, dec!(125.5));
        assert_eq!(basics.l1_address, "0xabc");

        let flat = json!({ "total_asset_value": 10, "collateral": 99 });
        assert_eq!(account_basics(&flat).equity, dec!(10));
    }

    #[test]
    fn test_positions_with_sign() {
        let payload = json!({
            "account": {
                "positions": [
                    { "symbol": "BTC", "position": "1.5", "sign": 1 },
                    { "symbol": "ETH", "position": "2", "sign": -1 },
                    { "market": "SOL", "qty": 3.0 },
                    { "position": "4" },
                    { "symbol": "DOGE" }
                ]
            }
        });
        let snap = positions(&payload);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.quantity("BTC"), 1.5);
        assert_eq!(snap.quantity("ETH"), -2.0);
        assert_eq!(snap.quantity("SOL"), 3.0);
    }

    #[test]
    fn test_pnl_metrics_alternate_names() {
        let payload = json!({ "pnl7d": "12.5", "winRate": 61, "trades7d": 14, "sharpe30d": 1.8 });
        let m = pnl_metrics(&payload);
        assert_eq!(m.pnl_7d_pct, Some(12.5));
        assert_eq!(m.win_rate_pct, Some(61.0));
        assert_eq!(m.trades_7d, Some(14));
        assert_eq!(m.sharpe_30d, Some(1.8));
        assert_eq!(m.max_drawdown_30d_pct, None);
    }
}
