//! Leader discovery: block scanning, ranking, and cached leader sources.

mod provider;
mod ranker;
mod scanner;

pub use provider::{LeaderDiscovery, LeaderProvider, LeaderSource, StaticLeaders};
pub use ranker::{LeaderRanker, SelectionParams, SortKey};
pub use scanner::ChainScanner;
