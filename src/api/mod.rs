//! Chain API plumbing: HTTP client, rate limiting, and payload extraction.

mod chain_client;
mod error;
pub mod extract;
mod rate_limit;

#[cfg(test)]
pub mod mock;

pub use chain_client::{AccountLookup, ChainApi, HttpChainClient, MAINNET_URL};
pub use error::ChainApiError;
pub use rate_limit::{RateLimitedClient, RetryPolicy};
