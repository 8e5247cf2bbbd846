//! Price feed adapter - DexScreener-style market data with caching

pub mod dexscreener;

pub use dexscreener::{DexScreenerFeed, PriceFeedConfig};
