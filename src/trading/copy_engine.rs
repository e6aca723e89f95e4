//! Copy-trading engine: turns leader signals into follower orders.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{extract, AccountLookup, ChainApi, RateLimitedClient};
use crate::models::{AccountIndex, CopyMode, LeaderConfig, Signal, SignalSide, SignalType};

use super::exchange::{Exchange, OrderAck};

/// Source of the follower account's current equity.
#[async_trait]
pub trait EquityProvider: Send + Sync {
    async fn equity(&self) -> Result<Decimal>;
}

/// Reads follower equity from the chain.
pub struct AccountEquity {
    api: Arc<dyn ChainApi>,
    limiter: Arc<RateLimitedClient>,
    lookup: AccountLookup,
}

impl AccountEquity {
    pub fn new(api: Arc<dyn ChainApi>, limiter: Arc<RateLimitedClient>, lookup: AccountLookup) -> Self {
        Self {
            api,
            limiter,
            lookup,
        }
    }
}

#[async_trait]
impl EquityProvider for AccountEquity {
    async fn equity(&self) -> Result<Decimal> {
        let api = &self.api;
        let lookup = &self.lookup;
        let payload = self
            .limiter
            .call("account", || api.account_snapshot(lookup))
            .await
            .with_context(|| format!("Failed to fetch follower account {}", lookup))?;

        let root = extract::account_root(&payload);
        extract::first_decimal(root, extract::EQUITY)
            .ok_or_else(|| anyhow!("No equity field for follower account {}", lookup))
    }
}

/// Stand-in when no follower account is configured; decisions carry
/// unknown equity.
pub struct UnknownEquity;

#[async_trait]
impl EquityProvider for UnknownEquity {
    async fn equity(&self) -> Result<Decimal> {
        Err(anyhow!("No follower account configured"))
    }
}

/// What to do with a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "reason", rename_all = "lowercase")]
pub enum CopyAction {
    Follow,
    Skip(String),
}

/// Decision payload handed to order placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopyDecision {
    pub leader: String,
    pub leader_account_index: AccountIndex,
    pub market: String,
    pub side: SignalSide,
    pub signal_type: SignalType,
    /// Follower equity; `None` when the provider could not be reached
    pub equity: Option<Decimal>,
    /// Follower order size in base units
    pub size: f64,
    /// Reference price carried over from the signal
    pub price: Option<f64>,
    pub slippage_bps: u32,
    pub client_ref: String,
    pub action: CopyAction,
}

impl CopyDecision {
    pub fn is_follow(&self) -> bool {
        self.action == CopyAction::Follow
    }
}

/// Follower size for a leader's quantity change.
pub fn copy_size(leader: &LeaderConfig, leader_delta: f64) -> f64 {
    let param = leader.copy_param.to_f64().unwrap_or(0.0);
    match leader.copy_mode {
        CopyMode::Proportional => leader_delta * param,
        CopyMode::Fixed => param,
    }
}

/// Shift `quote` against us by `slippage_bps`.
pub fn with_slippage(quote: f64, side: SignalSide, slippage_bps: u32) -> f64 {
    let shift = f64::from(slippage_bps) / 10_000.0;
    match side {
        SignalSide::Buy => quote * (1.0 + shift),
        SignalSide::Sell => quote * (1.0 - shift),
    }
}

/// Maps signals to copy decisions and executes them on an exchange.
pub struct CopyEngine {
    equity: Arc<dyn EquityProvider>,
    exchange: Arc<dyn Exchange>,
}

impl CopyEngine {
    pub fn new(equity: Arc<dyn EquityProvider>, exchange: Arc<dyn Exchange>) -> Self {
        Self { equity, exchange }
    }

    /// Build the decision for one signal. Never fails: an unreachable equity
    /// provider yields a decision with unknown equity.
    pub async fn on_signal(&self, signal: &Signal, leader: &LeaderConfig) -> CopyDecision {
        let equity = match self.equity.equity().await {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(leader = %leader.name, error = %e, "Equity unavailable, deciding without it");
                None
            }
        };

        let size = copy_size(leader, signal.size);
        let action = if !leader.enabled {
            CopyAction::Skip("leader disabled".to_string())
        } else if !leader.allows_market(&signal.market) {
            CopyAction::Skip(format!("market {} not allowed", signal.market))
        } else if !(size.is_finite() && size > 0.0) {
            CopyAction::Skip(format!("non-positive size {}", size))
        } else {
            CopyAction::Follow
        };

        let decision = CopyDecision {
            leader: leader.name.clone(),
            leader_account_index: leader.account_index,
            market: signal.market.clone(),
            side: signal.side,
            signal_type: signal.signal_type,
            equity,
            size,
            price: signal.price,
            slippage_bps: leader.slippage_bps,
            client_ref: signal.client_ref.clone(),
            action,
        };

        info!(
            leader = %decision.leader,
            market = %decision.market,
            side = %decision.side,
            signal_type = %decision.signal_type,
            equity = ?decision.equity,
            size = decision.size,
            action = ?decision.action,
            "Copy decision"
        );

        decision
    }

    /// Place the order for a followed decision.
    ///
    /// OPEN becomes a limit order at the crossing quote shifted by the
    /// leader's slippage, falling back to the signal price; without any price
    /// it is skipped. CLOSE becomes a market close.
    pub async fn execute(&self, decision: &CopyDecision) -> Result<Option<OrderAck>> {
        if let CopyAction::Skip(reason) = &decision.action {
            debug!(client_ref = %decision.client_ref, reason = %reason, "Not executing");
            return Ok(None);
        }

        let ack = match decision.signal_type {
            SignalType::Open => {
                let spread = match self.exchange.get_spread(&decision.market).await {
                    Ok(spread) => spread,
                    Err(e) => {
                        warn!(market = %decision.market, error = %e, "Spread unavailable");
                        Default::default()
                    }
                };

                let Some(quote) = spread.quote_for(decision.side).or(decision.price) else {
                    warn!(
                        market = %decision.market,
                        client_ref = %decision.client_ref,
                        "No price for copy order, skipping"
                    );
                    return Ok(None);
                };

                let price = with_slippage(quote, decision.side, decision.slippage_bps);
                debug!(
                    market = %decision.market,
                    quote = quote,
                    spread = ?spread.width(),
                    price = price,
                    "Pricing copy order"
                );
                self.exchange
                    .place_limit(
                        &decision.market,
                        decision.side,
                        price,
                        decision.size,
                        &decision.client_ref,
                    )
                    .await
                    .context("Failed to place copy order")?
            }
            SignalType::Close => self
                .exchange
                .close_market(
                    &decision.market,
                    decision.side.opposite(),
                    decision.size,
                    &decision.client_ref,
                )
                .await
                .context("Failed to close copied position")?,
        };

        info!(
            order_id = %ack.order_id,
            leader = %decision.leader,
            market = %decision.market,
            "Copy order submitted"
        );
        Ok(Some(ack))
    }

    /// Decide and execute in one step.
    pub async fn handle(&self, signal: &Signal, leader: &LeaderConfig) -> Result<Option<OrderAck>> {
        let decision = self.on_signal(signal, leader).await;
        self.execute(&decision).await
    }
}
