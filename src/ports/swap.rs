//! Swap port - aggregator-backed trade execution
//!
//! Builds and submits buy/sell swaps through the DEX aggregator,
//! including spender-allowance management. Implemented by
//! `adapters::aggregator::AggregatorRouter`.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use thiserror::Error;

use super::chain::ChainError;
use super::models::TxHash;
use crate::domain::gas_policy::GasQuote;

#[derive(Debug, Error)]
pub enum SwapError {
    /// The aggregator rejected the request or returned an unusable route.
    /// Happens before anything is signed, so the tick is safely abandoned.
    #[error("Swap build failed: {0}")]
    Build(String),

    /// Approval transaction reverted or timed out. The trade must be
    /// aborted; attempting the swap with insufficient allowance would
    /// fail mid-flight inside the router contract.
    #[error("Approval failed: {0}")]
    ApprovalFailed(String),

    /// The swap transaction was mined but reverted. Gas was spent;
    /// not retryable automatically.
    #[error("Swap reverted on-chain: {0}")]
    Reverted(TxHash),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

#[async_trait]
pub trait SwapPort: Send + Sync {
    /// Make sure `spender` can move at least `amount` of the traded token.
    /// Submits and confirms an approval transaction when the current
    /// on-chain allowance is short.
    async fn ensure_allowance(&self, spender: Address, amount: U256) -> Result<(), SwapError>;

    /// Swap `native_wei` of native currency into the token. `min_token_out`
    /// of zero is permitted only for explicitly flagged diagnostic trades.
    async fn buy(
        &self,
        native_wei: U256,
        min_token_out: U256,
        quote: &GasQuote,
    ) -> Result<TxHash, SwapError>;

    /// Swap `token_units` of the token back into native currency.
    /// Ensures the router allowance before submitting.
    async fn sell(
        &self,
        token_units: U256,
        min_native_out: U256,
        quote: &GasQuote,
    ) -> Result<TxHash, SwapError>;
}
