//! Snapshot diffing into OPEN/CLOSE signals.

use chrono::{DateTime, Utc};

use crate::models::{client_ref, AccountIndex, PositionSnapshot, Signal, SignalSide, SignalType};

/// Quantity changes at or below this are treated as noise.
pub const EPSILON: f64 = 1e-12;

/// Leader identity and observation time stamped onto emitted signals.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderContext {
    pub name: String,
    pub account_index: AccountIndex,
    pub l1_address: String,
    pub observed_at: DateTime<Utc>,
}

/// Compare two snapshots of one leader.
///
/// Returns nothing when `prev` is `None` (first observation). Every market in
/// either snapshot is considered, absent quantities count as zero, and the
/// output is ordered by market. A quantity increase is an OPEN/BUY and a
/// decrease a CLOSE/SELL, sized by the absolute change; a long to short flip
/// therefore surfaces as one CLOSE covering the whole move.
pub fn diff(prev: Option<&PositionSnapshot>, curr: &PositionSnapshot, ctx: &LeaderContext) -> Vec<Signal> {
    let Some(prev) = prev else {
        return Vec::new();
    };

    let mut markets: Vec<&str> = prev.markets().chain(curr.markets()).collect();
    markets.sort_unstable();
    markets.dedup();

    markets
        .into_iter()
        .filter_map(|market| {
            let q0 = prev.quantity(market);
            let q1 = curr.quantity(market);

            let (side, signal_type, tag) = if q1 > q0 + EPSILON {
                (SignalSide::Buy, SignalType::Open, "inc")
            } else if q1 < q0 - EPSILON {
                (SignalSide::Sell, SignalType::Close, "dec")
            } else {
                return None;
            };

            Some(Signal {
                leader: ctx.name.clone(),
                leader_account_index: ctx.account_index,
                leader_l1: ctx.l1_address.clone(),
                market: market.to_string(),
                side,
                price: None,
                size: (q1 - q0).abs(),
                signal_type,
                client_ref: client_ref(&ctx.name, market, side, ctx.observed_at, tag),
                ts: ctx.observed_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> LeaderContext {
        LeaderContext {
            name: "leader1-0xabcd...1234".to_string(),
            account_index: 42,
            l1_address: "0xabcd00000000000000000000000000000001234".to_string(),
            observed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn snap(entries: &[(&str, f64)]) -> PositionSnapshot {
        entries.iter().map(|(m, q)| (*m, *q)).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_increase_opens() {
        let signals = diff(Some(&snap(&[("BTC", 1.0)])), &snap(&[("BTC", 1.5)]), &ctx());

        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.market, "BTC");
        assert_eq!(s.side, SignalSide::Buy);
        assert_eq!(s.signal_type, SignalType::Open);
        assert!(approx(s.size, 0.5));
        assert_eq!(s.leader_account_index, 42);
        assert_eq!(s.ts, ctx().observed_at);
    }

    #[test]
    fn test_decrease_closes() {
        let signals = diff(Some(&snap(&[("BTC", 1.5)])), &snap(&[("BTC", 0.2)]), &ctx());

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, SignalSide::Sell);
        assert_eq!(signals[0].signal_type, SignalType::Close);
        assert!(approx(signals[0].size, 1.3));
    }

    #[test]
    fn test_identical_snapshots_are_silent() {
        let s = snap(&[("BTC", 1.0), ("ETH", -3.0), ("SOL", 0.0)]);
        assert!(diff(Some(&s), &s.clone(), &ctx()).is_empty());
    }

    #[test]
    fn test_changes_within_epsilon_are_silent() {
        let signals = diff(
            Some(&snap(&[("BTC", 1.0)])),
            &snap(&[("BTC", 1.0 + 1e-13)]),
            &ctx(),
        );
        assert!(signals.is_empty());
    }

    #[test]
    fn test_cold_start_never_emits() {
        assert!(diff(None, &snap(&[("BTC", 2.0), ("ETH", -1.0)]), &ctx()).is_empty());
    }

    #[test]
    fn test_empty_previous_snapshot_still_diffs() {
        let signals = diff(Some(&PositionSnapshot::new()), &snap(&[("ETH", 2.0)]), &ctx());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::Open);
    }

    #[test]
    fn test_markets_on_either_side() {
        let signals = diff(
            Some(&snap(&[("BTC", 1.0), ("DOGE", 100.0)])),
            &snap(&[("BTC", 1.0), ("ETH", 4.0)]),
            &ctx(),
        );

        let summary: Vec<_> = signals
            .iter()
            .map(|s| (s.market.as_str(), s.signal_type))
            .collect();
        assert_eq!(
            summary,
            vec![("DOGE", SignalType::Close), ("ETH", SignalType::Open)]
        );
        assert!(approx(signals[0].size, 100.0));
    }

    #[test]
    fn test_flip_is_single_close() {
        let signals = diff(Some(&snap(&[("BTC", 1.0)])), &snap(&[("BTC", -2.0)]), &ctx());

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::Close);
        assert!(approx(signals[0].size, 3.0));
    }

    #[test]
    fn test_client_refs_differ_per_market_and_side() {
        let signals = diff(
            Some(&snap(&[("BTC", 1.0), ("ETH", 1.0)])),
            &snap(&[("BTC", 2.0), ("ETH", 0.0)]),
            &ctx(),
        );

        assert_eq!(signals.len(), 2);
        assert_ne!(signals[0].client_ref, signals[1].client_ref);
        assert_eq!(signals[0].client_ref.len(), 24);
    }
}
