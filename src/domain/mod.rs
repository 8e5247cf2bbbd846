//! Domain layer - core business logic
//!
//! Anchor state machine memory, trading statistics, gas fee policy,
//! buy sizing, and durable persistence. No network I/O lives here.

pub mod anchor;
pub mod gas_policy;
pub mod persistence;
pub mod sizing;
pub mod stats;

pub use anchor::{ActionType, AnchorState};
pub use gas_policy::{GasPolicy, GasQuote};
pub use persistence::{PersistError, StateStore};
pub use stats::{TradeRecord, TradingStats};
