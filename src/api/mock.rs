//! Scripted in-memory chain API for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::AccountIndex;

use super::{AccountLookup, ChainApi, ChainApiError};

#[derive(Default)]
struct State {
    height: Option<u64>,
    blocks: HashMap<u64, Vec<Value>>,
    pnl: HashMap<AccountIndex, Value>,
    accounts: HashMap<AccountIndex, VecDeque<Value>>,
    failing_pnl: HashSet<AccountIndex>,
    failing_accounts: HashSet<AccountIndex>,
    block_calls: Vec<u64>,
    account_calls: Vec<AccountIndex>,
}

#[derive(Default)]
pub struct MockChainApi {
    state: Mutex<State>,
}

impl MockChainApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_height(self, height: u64) -> Self {
        self.state.lock().unwrap().height = Some(height);
        self
    }

    /// Block whose transactions were sent by the given accounts.
    pub fn with_block(self, height: u64, senders: &[AccountIndex]) -> Self {
        let txs = senders
            .iter()
            .map(|idx| json!({ "account_index": idx, "type": 14 }))
            .collect();
        self.state.lock().unwrap().blocks.insert(height, txs);
        self
    }

    pub fn set_height(&self, height: Option<u64>) {
        self.state.lock().unwrap().height = height;
    }

    pub fn with_raw_block(self, height: u64, txs: Vec<Value>) -> Self {
        self.state.lock().unwrap().blocks.insert(height, txs);
        self
    }

    pub fn with_pnl(self, idx: AccountIndex, payload: Value) -> Self {
        self.state.lock().unwrap().pnl.insert(idx, payload);
        self
    }

    /// Account payload returned on every fetch.
    pub fn with_account(self, idx: AccountIndex, payload: Value) -> Self {
        self.push_account(idx, payload);
        self
    }

    /// Queue a payload; the last queued payload repeats once the queue drains.
    pub fn push_account(&self, idx: AccountIndex, payload: Value) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .entry(idx)
            .or_default()
            .push_back(payload);
    }

    pub fn fail_pnl(self, idx: AccountIndex) -> Self {
        self.state.lock().unwrap().failing_pnl.insert(idx);
        self
    }

    pub fn set_account_failing(&self, idx: AccountIndex, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_accounts.insert(idx);
        } else {
            state.failing_accounts.remove(&idx);
        }
    }

    pub fn block_calls(&self) -> Vec<u64> {
        self.state.lock().unwrap().block_calls.clone()
    }

    pub fn account_calls(&self) -> Vec<AccountIndex> {
        self.state.lock().unwrap().account_calls.clone()
    }
}

/// Account payload with the given equity and positions.
pub fn account_payload(l1: &str, equity: f64, positions: &[(&str, f64)]) -> Value {
    let positions: Vec<Value> = positions
        .iter()
        .map(|(market, qty)| {
            let sign = if *qty < 0.0 { -1 } else { 1 };
            json!({
                "symbol": market,
                "position": qty.abs().to_string(),
                "sign": sign,
            })
        })
        .collect();

    json!({
        "accounts": [{
            "l1_address": l1,
            "total_asset_value": equity.to_string(),
            "positions": positions,
        }]
    })
}

#[async_trait]
impl ChainApi for MockChainApi {
    async fn current_height(&self) -> Result<u64, ChainApiError> {
        self.state
            .lock()
            .unwrap()
            .height
            .ok_or_else(|| ChainApiError::NotFound("height".into()))
    }

    async fn block_transactions(&self, height: u64) -> Result<Vec<Value>, ChainApiError> {
        let mut state = self.state.lock().unwrap();
        state.block_calls.push(height);
        Ok(state.blocks.get(&height).cloned().unwrap_or_default())
    }

    async fn account_pnl(&self, account_index: AccountIndex) -> Result<Value, ChainApiError> {
        let state = self.state.lock().unwrap();
        if state.failing_pnl.contains(&account_index) {
            return Err(ChainApiError::Http {
                status: 400,
                body: "pnl unavailable".into(),
            });
        }
        state
            .pnl
            .get(&account_index)
            .cloned()
            .ok_or_else(|| ChainApiError::NotFound(format!("pnl {}", account_index)))
    }

    async fn account_snapshot(&self, lookup: &AccountLookup) -> Result<Value, ChainApiError> {
        let AccountLookup::Index(idx) = lookup else {
            return Err(ChainApiError::NotFound(lookup.to_string()));
        };

        let mut state = self.state.lock().unwrap();
        state.account_calls.push(*idx);
        if state.failing_accounts.contains(idx) {
            return Err(ChainApiError::Http {
                status: 400,
                body: "account unavailable".into(),
            });
        }

        let queue = state
            .accounts
            .get_mut(idx)
            .ok_or_else(|| ChainApiError::NotFound(lookup.to_string()))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| ChainApiError::NotFound(lookup.to_string()))
        }
    }
}
