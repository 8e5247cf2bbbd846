//! Reactive strategy - the price-anchor state machine
//!
//! Two states: FLAT (not holding the token) and HOLD (holding). While
//! holding we only ever sell, while flat we only ever buy; the anchor
//! price and holding flag are updated together, only after a trade's
//! receipt confirms, and persisted before the next tick. That pairing is
//! what makes double-buys and double-sells unreachable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::anchor::{ActionType, AnchorState};
use crate::domain::gas_policy::{GasPolicy, GasQuote};
use crate::domain::persistence::{PersistError, StateStore};
use crate::domain::sizing::{is_dust, spendable_native};
use crate::domain::stats::{TradeRecord, TradingStats};
use crate::ports::chain::{ChainError, ChainPort};
use crate::ports::models::{decimal_to_units, PriceSnapshot, NATIVE_DECIMALS};
use crate::ports::price::PricePort;
use crate::ports::swap::{SwapError, SwapPort};

/// Tuning knobs, converted from config at startup.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    /// Sell when price >= anchor * (1 + sell_gain_pct).
    pub sell_gain_pct: Decimal,
    /// Rebuy when price <= anchor * (1 - rebuy_drop_pct).
    pub rebuy_drop_pct: Decimal,
    /// USD-denominated native reserve that is never spent.
    pub reserve_usd: Decimal,
    /// Token balances at or below this are dust.
    pub dust_token: Decimal,
    pub slippage_bps: u16,
    /// Gas units assumed for a swap when quoting fees.
    pub swap_gas_units: u64,
    pub receipt_timeout: Duration,
    pub token_decimals: u8,
    /// Log decisions without sending transactions.
    pub paper: bool,
}

/// Expected, frequent reasons a tick ends without a trade. These are
/// not failures of the system.
#[derive(Debug)]
pub enum SkipReason {
    PriceUnavailable(String),
    GasCapExceeded { cost_usd: Decimal },
    NoTrigger { price_usd: Decimal, anchor_usd: Decimal },
    NothingSpendable,
    DustBalance,
    Rpc(String),
    SwapBuild(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriceUnavailable(e) => write!(f, "price unavailable: {e}"),
            Self::GasCapExceeded { cost_usd } => {
                write!(f, "gas cost ${cost_usd} exceeds the configured cap")
            }
            Self::NoTrigger {
                price_usd,
                anchor_usd,
            } => write!(f, "no trigger (price ${price_usd}, anchor ${anchor_usd})"),
            Self::NothingSpendable => write!(f, "balance cannot cover reserve + gas"),
            Self::DustBalance => write!(f, "token balance is dust"),
            Self::Rpc(e) => write!(f, "rpc failed: {e}"),
            Self::SwapBuild(e) => write!(f, "swap build failed: {e}"),
        }
    }
}

/// Result of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    Traded(TradeRecord),
    Skipped(SkipReason),
}

/// Only persistence failures are fatal for the loop; everything else
/// resolves into a skip or a failed trade record.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("State persistence failed: {0}")]
    Persist(#[from] PersistError),

    #[error("Strategy startup failed: {0}")]
    Init(String),
}

pub struct ReactiveStrategy {
    chain: Arc<dyn ChainPort>,
    router: Arc<dyn SwapPort>,
    prices: Arc<dyn PricePort>,
    gas: GasPolicy,
    store: StateStore,
    params: StrategyParams,
    state: AnchorState,
    stats: TradingStats,
}

impl ReactiveStrategy {
    /// Load or infer the initial anchor state and build the strategy.
    pub async fn init(
        chain: Arc<dyn ChainPort>,
        router: Arc<dyn SwapPort>,
        prices: Arc<dyn PricePort>,
        gas: GasPolicy,
        store: StateStore,
        params: StrategyParams,
    ) -> Result<Self, StrategyError> {
        let stats = store.load_stats()?;
        let state = match store.load_state()? {
            Some(state) => {
                tracing::info!(
                    holding = state.holding,
                    anchor = %state.anchor_price_usd,
                    "Resumed anchor state"
                );
                state
            }
            None => {
                // First run: infer from the on-chain position.
                let balance = chain
                    .balances()
                    .await
                    .map_err(|e| StrategyError::Init(format!("balance fetch: {e}")))?;
                let state = if is_dust(balance.token, params.dust_token) {
                    AnchorState::default()
                } else {
                    let snapshot = prices
                        .price()
                        .await
                        .map_err(|e| StrategyError::Init(format!("price fetch: {e}")))?;
                    tracing::info!(
                        token_balance = %balance.token,
                        price = %snapshot.token_usd,
                        "Existing token position found, starting in HOLD"
                    );
                    AnchorState::inferred_holding(snapshot.token_usd)
                };
                store.save_state(&state)?;
                state
            }
        };

        Ok(Self {
            chain,
            router,
            prices,
            gas,
            store,
            params,
            state,
            stats,
        })
    }

    pub fn state(&self) -> &AnchorState {
        &self.state
    }

    pub fn stats(&self) -> &TradingStats {
        &self.stats
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: AnchorState) {
        self.state = state;
    }

    /// Evaluate one polling tick. A trade, when triggered, fully
    /// resolves (send, receipt, persist) before this returns; the
    /// caller must not run ticks concurrently.
    pub async fn tick(&mut self) -> Result<TickOutcome, StrategyError> {
        let snapshot = match self.prices.price().await {
            Ok(s) => s,
            Err(e) => return Ok(skip(SkipReason::PriceUnavailable(e.to_string()))),
        };

        // Gas is quoted and capped before any balance or allowance work,
        // so an expensive block costs us zero extra RPC calls.
        let quote = match self
            .gas
            .quote(self.chain.as_ref(), self.params.swap_gas_units)
            .await
        {
            Ok(q) => q,
            Err(e) => return Ok(skip(SkipReason::Rpc(e.to_string()))),
        };
        if !self.gas.within_usd_cap(&quote, &snapshot) {
            return Ok(skip(SkipReason::GasCapExceeded {
                cost_usd: self.gas.cost_usd(&quote, &snapshot).round_dp(2),
            }));
        }

        if self.state.holding {
            self.try_sell(&snapshot, &quote).await
        } else {
            self.try_buy(&snapshot, &quote).await
        }
    }

    async fn try_sell(
        &mut self,
        snapshot: &PriceSnapshot,
        quote: &GasQuote,
    ) -> Result<TickOutcome, StrategyError> {
        let anchor = self.state.anchor_price_usd;
        let trigger = anchor * (Decimal::ONE + self.params.sell_gain_pct);
        if snapshot.token_usd < trigger {
            return Ok(skip(SkipReason::NoTrigger {
                price_usd: snapshot.token_usd,
                anchor_usd: anchor,
            }));
        }

        let balance = match self.chain.balances().await {
            Ok(b) => b,
            Err(e) => return Ok(skip(SkipReason::Rpc(e.to_string()))),
        };
        if is_dust(balance.token, self.params.dust_token) {
            return Ok(skip(SkipReason::DustBalance));
        }

        // Without a native reference price, min_native_out would collapse
        // to zero and the sell would accept any output. Skip instead.
        if snapshot.native_usd <= Decimal::ZERO {
            return Ok(skip(SkipReason::PriceUnavailable(
                "no native reference price".into(),
            )));
        }
        let expected_native = balance.token * snapshot.token_usd / snapshot.native_usd;
        let min_native_out = decimal_to_units(
            self.apply_slippage(expected_native),
            NATIVE_DECIMALS as u8,
        );

        tracing::info!(
            price = %snapshot.token_usd,
            anchor = %anchor,
            amount = %balance.token,
            "Sell trigger hit, selling entire token balance"
        );

        if self.params.paper {
            return self
                .confirm_paper(ActionType::Sell, balance.token, expected_native, snapshot)
                .await;
        }

        let hash = match self
            .router
            .sell(balance.token_units, min_native_out, quote)
            .await
        {
            Ok(h) => h,
            Err(e) => return self.handle_swap_error(e, ActionType::Sell, snapshot).await,
        };

        self.settle(
            hash,
            ActionType::Sell,
            balance.token,
            expected_native,
            snapshot,
        )
        .await
    }

    async fn try_buy(
        &mut self,
        snapshot: &PriceSnapshot,
        quote: &GasQuote,
    ) -> Result<TickOutcome, StrategyError> {
        let anchor = self.state.anchor_price_usd;
        if anchor <= Decimal::ZERO {
            // Fresh state with no trade history: anchor to the current
            // price so the drop trigger has a reference point.
            tracing::info!(price = %snapshot.token_usd, "Bootstrapping anchor price");
            self.state.anchor_price_usd = snapshot.token_usd;
            self.state.last_action_price_usd = snapshot.token_usd;
            self.store.save_state(&self.state)?;
            return Ok(skip(SkipReason::NoTrigger {
                price_usd: snapshot.token_usd,
                anchor_usd: snapshot.token_usd,
            }));
        }

        let trigger = anchor * (Decimal::ONE - self.params.rebuy_drop_pct);
        if snapshot.token_usd > trigger {
            return Ok(skip(SkipReason::NoTrigger {
                price_usd: snapshot.token_usd,
                anchor_usd: anchor,
            }));
        }

        let balance = match self.chain.balances().await {
            Ok(b) => b,
            Err(e) => return Ok(skip(SkipReason::Rpc(e.to_string()))),
        };

        let spendable = match spendable_native(
            balance.native,
            self.params.reserve_usd,
            quote.estimated_cost_native,
            snapshot,
        ) {
            Some(s) => s,
            None => return Ok(skip(SkipReason::NothingSpendable)),
        };

        let native_wei = decimal_to_units(spendable, NATIVE_DECIMALS as u8);
        let expected_token = if snapshot.token_usd > Decimal::ZERO {
            spendable * snapshot.native_usd / snapshot.token_usd
        } else {
            Decimal::ZERO
        };
        let min_token_out = decimal_to_units(
            self.apply_slippage(expected_token),
            self.params.token_decimals,
        );

        tracing::info!(
            price = %snapshot.token_usd,
            anchor = %anchor,
            spend = %spendable,
            "Rebuy trigger hit, buying with spendable native balance"
        );

        if self.params.paper {
            return self
                .confirm_paper(ActionType::Buy, expected_token, spendable, snapshot)
                .await;
        }

        let hash = match self.router.buy(native_wei, min_token_out, quote).await {
            Ok(h) => h,
            Err(e) => return self.handle_swap_error(e, ActionType::Buy, snapshot).await,
        };

        self.settle(hash, ActionType::Buy, expected_token, spendable, snapshot)
            .await
    }

    /// Wait for the receipt and commit the outcome: anchor + state file
    /// on success, a failed trade record otherwise. Persistence happens
    /// before this returns, so memory and disk never diverge across a
    /// restart.
    async fn settle(
        &mut self,
        hash: crate::ports::models::TxHash,
        action: ActionType,
        token_amount: Decimal,
        native_amount: Decimal,
        snapshot: &PriceSnapshot,
    ) -> Result<TickOutcome, StrategyError> {
        let confirmed = match self
            .chain
            .wait_for_receipt(hash, self.params.receipt_timeout)
            .await
        {
            Ok(receipt) => receipt.success,
            Err(ChainError::Timeout(_)) => {
                // The transaction may still confirm later. Recorded as a
                // failed attempt; the anchor is only moved by a receipt.
                tracing::warn!(tx = %hash, "Receipt wait timed out, outcome unknown");
                false
            }
            Err(e) => {
                tracing::warn!(tx = %hash, error = %e, "Receipt wait failed");
                false
            }
        };

        if confirmed {
            match action {
                ActionType::Buy => self.state.record_buy(snapshot.token_usd),
                ActionType::Sell => self.state.record_sell(snapshot.token_usd),
                ActionType::None => {}
            }
            self.store.save_state(&self.state)?;
        }

        let record = TradeRecord {
            action,
            token_amount,
            native_amount,
            price_usd: snapshot.token_usd,
            tx_hash: format!("{hash:#x}"),
            success: confirmed,
            timestamp: Utc::now(),
        };
        self.stats.record(record.clone());
        self.store.save_stats(&self.stats)?;

        if confirmed {
            tracing::info!(tx = %record.tx_hash, action = ?action, "Trade confirmed");
        } else {
            tracing::warn!(tx = %record.tx_hash, action = ?action, "Trade failed, anchor unchanged");
        }
        Ok(TickOutcome::Traded(record))
    }

    /// Paper mode: pretend the swap confirmed at the snapshot price and
    /// run the exact persistence path a real trade takes.
    async fn confirm_paper(
        &mut self,
        action: ActionType,
        token_amount: Decimal,
        native_amount: Decimal,
        snapshot: &PriceSnapshot,
    ) -> Result<TickOutcome, StrategyError> {
        tracing::info!(action = ?action, price = %snapshot.token_usd, "PAPER TRADE");
        match action {
            ActionType::Buy => self.state.record_buy(snapshot.token_usd),
            ActionType::Sell => self.state.record_sell(snapshot.token_usd),
            ActionType::None => {}
        }
        self.store.save_state(&self.state)?;

        let record = TradeRecord {
            action,
            token_amount,
            native_amount,
            price_usd: snapshot.token_usd,
            tx_hash: "paper".to_string(),
            success: true,
            timestamp: Utc::now(),
        };
        self.stats.record(record.clone());
        self.store.save_stats(&self.stats)?;
        Ok(TickOutcome::Traded(record))
    }

    /// Swap errors before anything reached the chain abandon the tick;
    /// an approval failure or a revert after handing off the intent is
    /// terminal for this attempt and recorded.
    async fn handle_swap_error(
        &mut self,
        error: SwapError,
        action: ActionType,
        snapshot: &PriceSnapshot,
    ) -> Result<TickOutcome, StrategyError> {
        match error {
            SwapError::Build(e) => Ok(skip(SkipReason::SwapBuild(e))),
            // Transient RPC failures (allowance read, nonce fetch) with
            // retries exhausted: nothing was broadcast, so nothing is
            // recorded. The next tick retries from scratch.
            SwapError::Chain(ChainError::Rpc(e)) => Ok(skip(SkipReason::Rpc(e))),
            other => {
                tracing::warn!(error = %other, action = ?action, "Trade attempt failed");
                let record = TradeRecord {
                    action,
                    token_amount: Decimal::ZERO,
                    native_amount: Decimal::ZERO,
                    price_usd: snapshot.token_usd,
                    tx_hash: String::new(),
                    success: false,
                    timestamp: Utc::now(),
                };
                self.stats.record(record.clone());
                self.store.save_stats(&self.stats)?;
                Ok(TickOutcome::Traded(record))
            }
        }
    }

    fn apply_slippage(&self, expected: Decimal) -> Decimal {
        let keep = Decimal::from(10_000 - self.params.slippage_bps as i64) / Decimal::from(10_000);
        expected * keep
    }
}

fn skip(reason: SkipReason) -> TickOutcome {
    tracing::debug!("Tick skipped: {reason}");
    TickOutcome::Skipped(reason)
}
