//! Lighter Copy-Trading Watcher
//!
//! Discovers active on-chain accounts, ranks them into a leader set, and turns
//! leader position changes into copy signals and dry-run orders.

mod api;
mod config;
mod leaderboard;
mod models;
mod signals;
mod trading;
mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{extract, AccountLookup, ChainApi, HttpChainClient, RateLimitedClient, MAINNET_URL};
use crate::config::CopyConfig;
use crate::leaderboard::{
    ChainScanner, LeaderDiscovery, LeaderProvider, LeaderRanker, LeaderSource, StaticLeaders,
};
use crate::signals::LeaderPoller;
use crate::trading::{
    AccountEquity, CopyEngine, DryRunExchange, EquityProvider, InFlightGuard, UnknownEquity,
};
use crate::watcher::CopyWatcher;

/// Lighter copy-trading watcher CLI.
#[derive(Parser)]
#[command(name = "lightcopier")]
#[command(about = "Follow top Lighter accounts and emit copy signals", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Lighter API base URL
    #[arg(long, env = "LIGHTER_BASE_URL", default_value = MAINNET_URL)]
    base_url: String,

    /// Copy configuration file (JSON)
    #[arg(short, long, env = "LIGHTCOPIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan recent blocks and rank the most active accounts
    Discover {
        /// Number of leaders to show (defaults to follow_slots)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Poll leaders and copy their position changes (dry run)
    Watch,

    /// Show an account's equity and open positions
    Account {
        /// Account index
        #[arg(short, long, required_unless_present = "l1", conflicts_with = "l1")]
        index: Option<u64>,

        /// Owner L1 address, instead of an index
        #[arg(long)]
        l1: Option<String>,

        /// Print the raw API payload
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config,
}

/// Shared chain access: one client and one rate-limit gate for every caller.
struct Chain {
    api: Arc<dyn ChainApi>,
    limiter: Arc<RateLimitedClient>,
}

impl Chain {
    fn connect(base_url: &str, config: &CopyConfig) -> Result<Self> {
        let api = HttpChainClient::with_timeout(base_url, config.request_timeout())?;
        Ok(Self {
            api: Arc::new(api),
            limiter: Arc::new(RateLimitedClient::new(
                config.leaderboard.rps,
                config.retry_policy(),
            )),
        })
    }

    fn discovery(&self, config: &CopyConfig) -> LeaderDiscovery {
        let lb = &config.leaderboard;
        LeaderDiscovery::new(
            ChainScanner::new(self.api.clone(), self.limiter.clone()),
            LeaderRanker::new(self.api.clone(), self.limiter.clone(), lb.max_accounts),
            lb.lookback_blocks,
            lb.max_accounts,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = CopyConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Discover { limit } => {
            let chain = Chain::connect(&cli.base_url, &config)?;
            let mut params = config.selection();
            if let Some(n) = limit {
                params.n = n;
            }

            info!(
                lookback = config.leaderboard.lookback_blocks,
                n = params.n,
                sort_by = %params.sort_by,
                "Discovering leaders"
            );

            let leaders = chain.discovery(&config).top_n(&params).await?;
            if leaders.is_empty() {
                println!(
                    "No eligible leaders found in the last {} blocks.",
                    config.leaderboard.lookback_blocks
                );
                return Ok(());
            }

            println!(
                "\n{:<24} {:>8} {:>12} {:>8} {:>8} {:>7} {:>7}",
                "NAME", "ACCOUNT", "EQUITY", "PNL7D%", "SHARPE", "TRADES", "DD30%"
            );
            println!("{}", "-".repeat(82));

            for s in leaders {
                println!(
                    "{:<24} {:>8} {:>12.2} {:>8} {:>8} {:>7} {:>7}",
                    truncate(&s.name, 22),
                    s.account_index,
                    s.equity,
                    fmt_opt(s.pnl_7d_pct),
                    fmt_opt(s.sharpe_30d),
                    s.trades_7d.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string()),
                    fmt_opt(s.max_drawdown_30d_pct),
                );
            }
        }

        Commands::Watch => {
            let chain = Chain::connect(&cli.base_url, &config)?;

            let source: Arc<dyn LeaderSource> = if config.leaders.is_empty() {
                Arc::new(LeaderProvider::new(
                    chain.discovery(&config),
                    config.selection(),
                    config.copy_defaults.clone(),
                    config.refresh_interval(),
                ))
            } else {
                info!(leaders = config.leaders.len(), "Using configured leaders");
                Arc::new(StaticLeaders::new(config.leaders.clone()))
            };

            let equity: Arc<dyn EquityProvider> = match config.follower_account_index {
                Some(idx) => Arc::new(AccountEquity::new(
                    chain.api.clone(),
                    chain.limiter.clone(),
                    AccountLookup::Index(idx),
                )),
                None => Arc::new(UnknownEquity),
            };
            let engine = Arc::new(CopyEngine::new(equity, Arc::new(DryRunExchange::new())));

            let poller = LeaderPoller::new(chain.api.clone(), chain.limiter.clone(), source.clone());
            let mut watcher = CopyWatcher::new(poller, config.poll_interval());
            watcher.subscribe_alerts();
            watcher.subscribe_execution(engine, source, InFlightGuard::new());

            println!("\n=== Lighter Copy Watcher ===");
            println!("API:              {}", cli.base_url);
            println!("Poll interval:    {}s", config.poll.interval_sec);
            println!("Leader refresh:   {}s", config.leaderboard.refresh_sec);
            println!("Request spacing:  {:?}", chain.limiter.min_interval());
            println!("Mode:             DRY RUN (orders are logged, not sent)");
            println!("\nPress Ctrl+C to stop.\n");

            watcher.run().await?;
        }

        Commands::Account { index, l1, json } => {
            let lookup = match (index, l1) {
                (Some(idx), _) => AccountLookup::Index(idx),
                (None, Some(addr)) => AccountLookup::l1_address(&addr)
                    .ok_or_else(|| anyhow!("Invalid L1 address: {}", addr))?,
                (None, None) => bail!("Either --index or --l1 is required"),
            };

            let chain = Chain::connect(&cli.base_url, &config)?;
            let api = &chain.api;
            let payload = chain
                .limiter
                .call("account", || api.account_snapshot(&lookup))
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            let basics = extract::account_basics(&payload);
            let positions = extract::positions(&payload);

            println!("\n=== Account {} ===", lookup);
            let l1 = if basics.l1_address.is_empty() {
                "-"
            } else {
                basics.l1_address.as_str()
            };
            println!("L1 Address: {}", l1);
            println!("Equity:     ${:.2}", basics.equity);

            println!("\n--- Open Positions ({}) ---", positions.len());
            if positions.is_empty() {
                println!("  (none)");
            }
            for (market, qty) in positions.iter() {
                let side = if qty < 0.0 { "SHORT" } else { "LONG" };
                println!("  {:<12} {:<5} {}", market, side, qty.abs());
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string())
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
