//! In-process signal fan-out.

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::Result;
use tracing::{error, warn};

use crate::models::Signal;

/// Callback invoked for every published signal.
pub type SignalHandler = Box<dyn Fn(&Signal) -> Result<()> + Send + Sync>;

/// Synchronous publish/subscribe with per-handler fault isolation.
///
/// Handlers run in registration order. A handler that returns an error or
/// panics is logged and skipped; delivery to the remaining handlers continues.
#[derive(Default)]
pub struct SignalBus {
    handlers: Vec<SignalHandler>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&Signal) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    pub fn subscribers(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver one signal; returns how many handlers completed successfully.
    pub fn publish(&self, signal: &Signal) -> usize {
        let mut delivered = 0;

        for (slot, handler) in self.handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(signal))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        handler = slot,
                        leader = %signal.leader,
                        market = %signal.market,
                        client_ref = %signal.client_ref,
                        error = %e,
                        "Signal handler failed"
                    );
                }
                Err(_) => {
                    error!(
                        handler = slot,
                        leader = %signal.leader,
                        client_ref = %signal.client_ref,
                        "Signal handler panicked"
                    );
                }
            }
        }

        delivered
    }

    pub fn publish_many(&self, signals: &[Signal]) -> usize {
        signals.iter().map(|s| self.publish(s)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignalSide, SignalType};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn signal(market: &str) -> Signal {
        Signal {
            leader: "leader1".to_string(),
            leader_account_index: 1,
            leader_l1: String::new(),
            market: market.to_string(),
            side: SignalSide::Buy,
            price: None,
            size: 1.0,
            signal_type: SignalType::Open,
            client_ref: "abc".to_string(),
            ts: Utc::now(),
        }
    }

    fn recorder(bus: &mut SignalBus, tag: &'static str) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        bus.subscribe(move |s: &Signal| {
            sink.lock().unwrap().push(format!("{}:{}", tag, s.market));
            Ok(())
        });
        log
    }

    #[test]
    fn test_failing_handler_does_not_stop_delivery() {
        let mut bus = SignalBus::new();
        let first = recorder(&mut bus, "first");
        bus.subscribe(|_: &Signal| anyhow::bail!("boom"));
        let last = recorder(&mut bus, "last");

        assert_eq!(bus.publish(&signal("BTC")), 2);
        assert_eq!(*first.lock().unwrap(), vec!["first:BTC"]);
        assert_eq!(*last.lock().unwrap(), vec!["last:BTC"]);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let mut bus = SignalBus::new();
        bus.subscribe(|_: &Signal| panic!("handler bug"));
        let after = recorder(&mut bus, "after");

        assert_eq!(bus.publish(&signal("ETH")), 1);
        assert_eq!(after.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_publish_many_preserves_order() {
        let mut bus = SignalBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let sink = log.clone();
            bus.subscribe(move |s: &Signal| {
                sink.lock().unwrap().push(format!("{}:{}", tag, s.market));
                Ok(())
            });
        }

        bus.publish_many(&[signal("BTC"), signal("ETH")]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:BTC", "b:BTC", "a:ETH", "b:ETH"]
        );
    }

    #[test]
    fn test_no_subscribers() {
        let bus = SignalBus::new();
        assert_eq!(bus.subscribers(), 0);
        assert_eq!(bus.publish(&signal("BTC")), 0);
    }
}
