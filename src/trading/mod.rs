//! Trading: copy decisions, order placement, and per-leader execution limits.

mod copy_engine;
mod exchange;
mod inflight;

pub use copy_engine::{AccountEquity, CopyEngine, EquityProvider, UnknownEquity};
pub use exchange::DryRunExchange;
pub use inflight::InFlightGuard;

#[cfg(test)]
pub use exchange::Spread;
