//! Adapters - concrete implementations of the ports
//!
//! Everything that touches the outside world lives here: the EVM RPC
//! client, the swap-aggregator HTTP client, the price feed and the CLI.

pub mod aggregator;
pub mod cli;
pub mod evm;
pub mod price_feed;
