//! Price port - USD price feed with caching
//!
//! Implemented by `adapters::price_feed::DexScreenerFeed`.

use async_trait::async_trait;
use thiserror::Error;

use super::models::PriceSnapshot;

#[derive(Debug, Error)]
pub enum PriceError {
    /// No fresh price and the cached snapshot is past the hard staleness
    /// ceiling. The strategy must skip the tick rather than trade on
    /// stale data.
    #[error("Price unavailable: {0}")]
    Unavailable(String),

    /// Feed request failed. The adapter retries and serves cache first;
    /// this surfaces only when both fail.
    #[error("Price API error: {0}")]
    Api(String),

    /// Feed returned a payload we could not interpret.
    #[error("Price parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait PricePort: Send + Sync {
    /// Current price snapshot, served from the fast-tier cache when fresh.
    async fn price(&self) -> Result<PriceSnapshot, PriceError>;
}
