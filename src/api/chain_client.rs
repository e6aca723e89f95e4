//! Lighter REST client for block, transaction, and account data.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::models::AccountIndex;

use super::{extract, ChainApiError};

pub const MAINNET_URL: &str = "https://mainnet.zklighter.elliot.ai";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const PNL_LOOKBACK_DAYS: i64 = 30;

/// How to address an account in an account lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLookup {
    Index(AccountIndex),
    L1Address(String),
}

impl AccountLookup {
    /// Lookup by owner address. Returns `None` unless `addr` is a 20-byte hex
    /// address; the stored form is lowercase with a `0x` prefix.
    pub fn l1_address(addr: &str) -> Option<Self> {
        let addr = Address::from_str(addr.trim()).ok()?;
        Some(AccountLookup::L1Address(format!("0x{}", hex::encode(addr.as_slice()))))
    }

    fn query(&self) -> (&'static str, String) {
        match self {
            AccountLookup::Index(idx) => ("index", idx.to_string()),
            AccountLookup::L1Address(addr) => ("l1_address", addr.clone()),
        }
    }
}

impl std::fmt::Display for AccountLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountLookup::Index(idx) => write!(f, "index:{}", idx),
            AccountLookup::L1Address(addr) => write!(f, "l1:{}", addr),
        }
    }
}

/// Read-only chain data the copy pipeline depends on.
///
/// Payloads other than the height are returned raw; callers pull fields out
/// with the candidate lists in [`extract`].
#[async_trait]
pub trait ChainApi: Send + Sync {
    async fn current_height(&self) -> Result<u64, ChainApiError>;

    async fn block_transactions(&self, height: u64) -> Result<Vec<Value>, ChainApiError>;

    async fn account_pnl(&self, account_index: AccountIndex) -> Result<Value, ChainApiError>;

    async fn account_snapshot(&self, lookup: &AccountLookup) -> Result<Value, ChainApiError>;
}

/// HTTP implementation of [`ChainApi`].
pub struct HttpChainClient {
    client: Client,
    base_url: String,
}

impl HttpChainClient {
    /// Create a client with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ChainApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, ?query, "Chain API request");

        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChainApiError::from_status(status, body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChainApi for HttpChainClient {
    async fn current_height(&self) -> Result<u64, ChainApiError> {
        let payload = self.get_json("/api/v1/currentHeight", &[]).await?;
        extract::height(&payload)
            .ok_or_else(|| ChainApiError::DataShape(format!("no height in {}", payload)))
    }

    async fn block_transactions(&self, height: u64) -> Result<Vec<Value>, ChainApiError> {
        let payload = self
            .get_json(
                "/api/v1/blockTxs",
                &[("by", "block_height".to_string()), ("value", height.to_string())],
            )
            .await?;
        Ok(extract::block_transactions(&payload))
    }

    async fn account_pnl(&self, account_index: AccountIndex) -> Result<Value, ChainApiError> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(PNL_LOOKBACK_DAYS);

        self.get_json(
            "/api/v1/pnl",
            &[
                ("by", "index".to_string()),
                ("value", account_index.to_string()),
                ("resolution", "1d".to_string()),
                ("start_timestamp", start.timestamp_millis().to_string()),
                ("end_timestamp", end.timestamp_millis().to_string()),
                ("count_back", PNL_LOOKBACK_DAYS.to_string()),
            ],
        )
        .await
    }

    async fn account_snapshot(&self, lookup: &AccountLookup) -> Result<Value, ChainApiError> {
        let (by, value) = lookup.query();
        self.get_json("/api/v1/account", &[("by", by.to_string()), ("value", value)])
            .await
    }
}
