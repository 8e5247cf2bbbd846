//! Cumulative trading statistics
//!
//! Every trade attempt, success or failure, is folded into the stats
//! aggregate and persisted before the next tick is processed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::anchor::ActionType;

/// How many recent trade records the stats file keeps.
const RECENT_TRADES_KEPT: usize = 50;

/// One executed (or attempted) trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub action: ActionType,
    pub token_amount: Decimal,
    pub native_amount: Decimal,
    pub price_usd: Decimal,
    pub tx_hash: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Cumulative counters, persisted after every attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingStats {
    pub total_trades: u64,
    pub successes: u64,
    pub failures: u64,
    /// Total native currency spent on buys (successful only).
    pub native_spent: Decimal,
    /// Total native currency received from sells (successful only).
    pub native_received: Decimal,
    /// Most recent trade records, newest last.
    #[serde(default)]
    pub recent: Vec<TradeRecord>,
}

impl TradingStats {
    pub fn record(&mut self, trade: TradeRecord) {
        self.total_trades += 1;
        if trade.success {
            self.successes += 1;
            match trade.action {
                ActionType::Buy => self.native_spent += trade.native_amount,
                ActionType::Sell => self.native_received += trade.native_amount,
                ActionType::None => {}
            }
        } else {
            self.failures += 1;
        }
        self.recent.push(trade);
        if self.recent.len() > RECENT_TRADES_KEPT {
            let excess = self.recent.len() - RECENT_TRADES_KEPT;
            self.recent.drain(..excess);
        }
    }
}
