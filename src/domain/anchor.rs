//! Anchor state - the durable strategy memory
//!
//! Records whether the bot is holding the token and the USD price of the
//! last confirmed trade. Every future buy/sell trigger is computed
//! relative to the anchor price. Mutated exactly once per confirmed
//! trade, never speculatively.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the last confirmed trade was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Buy,
    Sell,
    None,
}

/// Durable strategy memory, persisted through the state store.
///
/// Invariant: `holding == true` implies `last_action == Buy`;
/// `holding == false` implies `last_action` is `Sell` or `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorState {
    pub holding: bool,
    pub anchor_price_usd: Decimal,
    pub last_action: ActionType,
    pub last_action_price_usd: Decimal,
}

impl Default for AnchorState {
    fn default() -> Self {
        Self {
            holding: false,
            anchor_price_usd: Decimal::ZERO,
            last_action: ActionType::None,
            last_action_price_usd: Decimal::ZERO,
        }
    }
}

impl AnchorState {
    /// State inferred on first run from an existing on-chain position:
    /// a non-dust token balance means we are already holding, anchored
    /// at the current price.
    pub fn inferred_holding(current_price_usd: Decimal) -> Self {
        Self {
            holding: true,
            anchor_price_usd: current_price_usd,
            last_action: ActionType::Buy,
            last_action_price_usd: current_price_usd,
        }
    }

    /// Apply a confirmed buy: anchor moves to the purchase price.
    pub fn record_buy(&mut self, price_usd: Decimal) {
        self.holding = true;
        self.anchor_price_usd = price_usd;
        self.last_action = ActionType::Buy;
        self.last_action_price_usd = price_usd;
    }

    /// Apply a confirmed sell: anchor moves to the sale price.
    pub fn record_sell(&mut self, price_usd: Decimal) {
        self.holding = false;
        self.anchor_price_usd = price_usd;
        self.last_action = ActionType::Sell;
        self.last_action_price_usd = price_usd;
    }

    /// The holding/last-action invariant. Checked after every mutation
    /// and on load.
    pub fn is_consistent(&self) -> bool {
        if self.holding {
            self.last_action == ActionType::Buy
        } else {
            matches!(self.last_action, ActionType::Sell | ActionType::None)
        }
    }
}
