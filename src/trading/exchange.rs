//! Order placement boundary and a dry-run implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::SignalSide;

/// Top of book for one market. Either side may be missing on a thin book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

impl Spread {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self {
            bid: Some(bid),
            ask: Some(ask),
        }
    }

    /// Price we would cross at: the ask when buying, the bid when selling.
    pub fn quote_for(&self, side: SignalSide) -> Option<f64> {
        match side {
            SignalSide::Buy => self.ask,
            SignalSide::Sell => self.bid,
        }
    }

    pub fn width(&self) -> Option<f64> {
        Some(self.ask? - self.bid?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    TakeProfit,
    StopLoss,
}

/// A single order as it would be sent to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLeg {
    pub market: String,
    pub side: SignalSide,
    pub order_type: OrderType,
    pub base_amount: f64,
    pub price: Option<f64>,
    pub client_order_id: String,
}

/// Entry with optional take-profit and stop-loss exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub market: String,
    pub side: SignalSide,
    /// Limit entry price; market entry when absent
    pub entry_px: Option<f64>,
    pub stop_px: Option<f64>,
    pub tp_px: Option<f64>,
    pub base_amount: f64,
    pub client_ref: String,
}

impl OrderIntent {
    /// Entry leg followed by any exit legs on the opposite side.
    pub fn legs(&self) -> Vec<OrderLeg> {
        let entry_type = if self.entry_px.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        };

        let mut legs = vec![OrderLeg {
            market: self.market.clone(),
            side: self.side,
            order_type: entry_type,
            base_amount: self.base_amount,
            price: self.entry_px,
            client_order_id: format!("e-{}", self.client_ref),
        }];

        let exits = [
            (self.tp_px, OrderType::TakeProfit, "tp"),
            (self.stop_px, OrderType::StopLoss, "sl"),
        ];
        for (price, order_type, prefix) in exits {
            if let Some(price) = price {
                legs.push(OrderLeg {
                    market: self.market.clone(),
                    side: self.side.opposite(),
                    order_type,
                    base_amount: self.base_amount,
                    price: Some(price),
                    client_order_id: format!("{}-{}", prefix, self.client_ref),
                });
            }
        }

        legs
    }
}

/// Exchange acknowledgement for a submitted order or batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub client_ref: String,
    pub legs: usize,
}

/// Order placement collaborator.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_spread(&self, market: &str) -> Result<Spread>;

    async fn place_limit(
        &self,
        market: &str,
        side: SignalSide,
        price: f64,
        base_amount: f64,
        client_ref: &str,
    ) -> Result<OrderAck>;

    async fn place_bracket(&self, intent: &OrderIntent) -> Result<OrderAck>;

    /// Flatten `base_amount` of a position currently on `current_side`.
    async fn close_market(
        &self,
        market: &str,
        current_side: SignalSide,
        base_amount: f64,
        client_ref: &str,
    ) -> Result<OrderAck>;
}

/// Logs and records orders without sending anything.
#[derive(Default)]
pub struct DryRunExchange {
    spreads: Mutex<HashMap<String, Spread>>,
    orders: Mutex<Vec<OrderLeg>>,
}

impl DryRunExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote returned by `get_spread` for `market`.
    pub fn set_spread(&self, market: &str, spread: Spread) {
        self.spreads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(market.to_string(), spread);
    }

    /// Every leg submitted so far, in submission order.
    pub fn orders(&self) -> Vec<OrderLeg> {
        self.orders.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn submit(&self, legs: Vec<OrderLeg>, client_ref: &str) -> OrderAck {
        let ack = OrderAck {
            order_id: Uuid::new_v4().to_string(),
            client_ref: client_ref.to_string(),
            legs: legs.len(),
        };

        for leg in &legs {
            info!(
                order_id = %ack.order_id,
                market = %leg.market,
                side = %leg.side,
                order_type = ?leg.order_type,
                base_amount = leg.base_amount,
                price = ?leg.price,
                at = %Utc::now().to_rfc3339(),
                "[DRY RUN] Order"
            );
        }

        self.orders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(legs);
        ack
    }
}

#[async_trait]
impl Exchange for DryRunExchange {
    async fn get_spread(&self, market: &str) -> Result<Spread> {
        Ok(self
            .spreads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(market)
            .copied()
            .unwrap_or_default())
    }

    async fn place_limit(
        &self,
        market: &str,
        side: SignalSide,
        price: f64,
        base_amount: f64,
        client_ref: &str,
    ) -> Result<OrderAck> {
        let leg = OrderLeg {
            market: market.to_string(),
            side,
            order_type: OrderType::Limit,
            base_amount,
            price: Some(price),
            client_order_id: client_ref.to_string(),
        };
        Ok(self.submit(vec![leg], client_ref))
    }

    async fn place_bracket(&self, intent: &OrderIntent) -> Result<OrderAck> {
        Ok(self.submit(intent.legs(), &intent.client_ref))
    }

    async fn close_market(
        &self,
        market: &str,
        current_side: SignalSide,
        base_amount: f64,
        client_ref: &str,
    ) -> Result<OrderAck> {
        let leg = OrderLeg {
            market: market.to_string(),
            side: current_side.opposite(),
            order_type: OrderType::Market,
            base_amount,
            price: None,
            client_order_id: client_ref.to_string(),
        };
        Ok(self.submit(vec![leg], client_ref))
    }
}
