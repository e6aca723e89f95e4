//! Point-in-time view of a leader's open positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Market symbol to signed base quantity (positive long, negative short).
///
/// Markets are kept ordered so that diffs are produced in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    positions: BTreeMap<String, f64>,
}

impl PositionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantity held in a market; zero when the market is absent.
    pub fn quantity(&self, market: &str) -> f64 {
        self.positions.get(market).copied().unwrap_or(0.0)
    }

    pub fn markets(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.positions.iter().map(|(m, q)| (m.as_str(), *q))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for PositionSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            positions: iter.into_iter().map(|(m, q)| (m.into(), q)).collect(),
        }
    }
}
