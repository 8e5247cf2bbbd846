//! Ports layer - trait definitions for external dependencies
//!
//! Hexagonal seams between the strategy and the outside world:
//! - `chain`: node RPC (balances, gas, nonce, tx submission)
//! - `swap`: aggregator-backed trade execution
//! - `price`: USD price feed
//! - `mocks`: recording fakes for tests

pub mod chain;
pub mod mocks;
pub mod models;
pub mod price;
pub mod swap;

pub use chain::{ChainError, ChainPort};
pub use models::{Balance, PriceSnapshot, Receipt, TxHash, TxIntent};
pub use price::{PriceError, PricePort};
pub use swap::{SwapError, SwapPort};
