//! Copy-watch loop: poll leaders, publish signals, dispatch executions.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::leaderboard::LeaderSource;
use crate::models::Signal;
use crate::signals::{LeaderPoller, SignalBus};
use crate::trading::{CopyEngine, InFlightGuard};

/// Drives the poll, diff, and publish cycle on a fixed interval.
pub struct CopyWatcher {
    poller: LeaderPoller,
    bus: SignalBus,
    interval: Duration,
}

impl CopyWatcher {
    pub fn new(poller: LeaderPoller, interval: Duration) -> Self {
        Self {
            poller,
            bus: SignalBus::new(),
            interval,
        }
    }

    pub fn bus_mut(&mut self) -> &mut SignalBus {
        &mut self.bus
    }

    /// Log every signal at info level.
    pub fn subscribe_alerts(&mut self) {
        self.bus.subscribe(|signal: &Signal| {
            info!(
                leader = %signal.leader,
                market = %signal.market,
                side = %signal.side,
                signal_type = %signal.signal_type,
                size = signal.size,
                client_ref = %signal.client_ref,
                "Copy signal"
            );
            Ok(())
        });
    }

    /// Execute signals through `engine` on spawned tasks.
    ///
    /// At most one execution per leader runs at a time; a signal arriving
    /// while its leader is busy is dropped.
    pub fn subscribe_execution(
        &mut self,
        engine: Arc<CopyEngine>,
        source: Arc<dyn LeaderSource>,
        guard: InFlightGuard,
    ) {
        self.bus.subscribe(move |signal: &Signal| {
            let Some(permit) = guard.try_acquire(signal.leader_account_index) else {
                warn!(
                    leader = %signal.leader,
                    client_ref = %signal.client_ref,
                    "Execution already in flight for leader, dropping signal"
                );
                return Ok(());
            };

            let runtime = tokio::runtime::Handle::try_current()
                .context("Copy execution needs a Tokio runtime")?;
            let engine = engine.clone();
            let source = source.clone();
            let signal = signal.clone();

            runtime.spawn(async move {
                let _permit = permit;
                let task = execute_signal(&engine, source.as_ref(), &signal);
                match AssertUnwindSafe(task).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(
                            leader = %signal.leader,
                            client_ref = %signal.client_ref,
                            error = %e,
                            "Copy execution failed"
                        );
                    }
                    Err(_) => {
                        error!(
                            leader = %signal.leader,
                            client_ref = %signal.client_ref,
                            "Copy execution panicked"
                        );
                    }
                }
            });
            Ok(())
        });
    }

    /// One poll cycle; returns the number of signals published.
    pub async fn tick(&mut self) -> Result<usize> {
        let signals = self.poller.tick().await?;
        if !signals.is_empty() {
            self.bus.publish_many(&signals);
        }
        Ok(signals.len())
    }

    /// Run until Ctrl-C. Tick errors are logged and the loop continues.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            subscribers = self.bus.subscribers(),
            "Starting copy watcher"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(n) => debug!(signals = n, "Tick complete"),
                        Err(e) => error!(error = %e, "Error in watcher tick"),
                    }
                }
            }
        }

        Ok(())
    }
}

async fn execute_signal(
    engine: &CopyEngine,
    source: &dyn LeaderSource,
    signal: &Signal,
) -> Result<()> {
    let leaders = source.current().await;
    let Some(leader) = leaders
        .iter()
        .find(|l| l.account_index == signal.leader_account_index)
    else {
        debug!(leader = %signal.leader, "Leader no longer followed, ignoring signal");
        return Ok(());
    };

    engine.handle(signal, leader).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{account_payload, MockChainApi};
    use crate::api::{RateLimitedClient, RetryPolicy};
    use crate::leaderboard::StaticLeaders;
    use crate::models::{CopyDefaults, LeaderConfig, TraderStats};
    use crate::trading::{DryRunExchange, Spread, UnknownEquity};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn leader(idx: u64) -> LeaderConfig {
        let stats = TraderStats {
            name: format!("leader{}", idx),
            ..TraderStats::equity_only(idx, String::new(), dec!(100))
        };
        LeaderConfig::from_stats(&stats, &CopyDefaults::default())
    }

    /// Leader 1 goes from 1 BTC to 3 BTC between the first two polls.
    fn setup() -> (CopyWatcher, Arc<dyn LeaderSource>) {
        let api = Arc::new(
            MockChainApi::new().with_account(1, account_payload("0x1", 100.0, &[("BTC", 1.0)])),
        );
        api.push_account(1, account_payload("0x1", 100.0, &[("BTC", 3.0)]));

        let source: Arc<dyn LeaderSource> = Arc::new(StaticLeaders::new(vec![leader(1)]));
        let poller = LeaderPoller::new(
            api,
            Arc::new(RateLimitedClient::new(1000.0, RetryPolicy::default())),
            source.clone(),
        );
        (CopyWatcher::new(poller, Duration::from_secs(5)), source)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_tick_publishes_signals() {
        let (mut watcher, _) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        watcher.subscribe_alerts();
        watcher.bus_mut().subscribe(move |s: &Signal| {
            sink.lock().unwrap().push(s.client_ref.clone());
            Ok(())
        });

        assert_eq!(watcher.tick().await.unwrap(), 0);
        assert_eq!(watcher.tick().await.unwrap(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execution_places_order() {
        let (mut watcher, source) = setup();
        let exchange = Arc::new(DryRunExchange::new());
        exchange.set_spread("BTC", Spread::new(100.0, 101.0));
        let engine = Arc::new(CopyEngine::new(Arc::new(UnknownEquity), exchange.clone()));
        let guard = InFlightGuard::new();
        watcher.subscribe_execution(engine, source, guard.clone());

        watcher.tick().await.unwrap();
        watcher.tick().await.unwrap();
        settle().await;

        let orders = exchange.orders();
        assert_eq!(orders.len(), 1);
        assert!((orders[0].base_amount - 1.0).abs() < 1e-9);
        assert!(!guard.is_busy(1));
    }

    #[tokio::test]
    async fn test_busy_leader_drops_signal() {
        let (mut watcher, source) = setup();
        let exchange = Arc::new(DryRunExchange::new());
        exchange.set_spread("BTC", Spread::new(100.0, 101.0));
        let engine = Arc::new(CopyEngine::new(Arc::new(UnknownEquity), exchange.clone()));
        let guard = InFlightGuard::new();
        watcher.subscribe_execution(engine, source, guard.clone());

        let _held = guard.try_acquire(1).unwrap();
        watcher.tick().await.unwrap();
        watcher.tick().await.unwrap();
        settle().await;

        assert!(exchange.orders().is_empty());
    }
}
