//! Chain port - node RPC facade
//!
//! Thin abstraction over the JSON-RPC provider: balances, gas parameters,
//! nonce, allowance reads and transaction submission. Implemented by
//! `adapters::evm::EvmChainClient`, mocked for strategy tests.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use thiserror::Error;

use super::models::{Balance, Receipt, TxHash, TxIntent};

#[derive(Debug, Error)]
pub enum ChainError {
    /// Network or provider failure. Retryable with backoff.
    #[error("RPC request failed: {0}")]
    Rpc(String),

    /// The account cannot cover value + gas for the transaction.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Nonce mismatch at broadcast time.
    #[error("Nonce error: {0}")]
    Nonce(String),

    /// Receipt did not arrive in time. The transaction may still
    /// confirm later; callers must not assume failure.
    #[error("Timed out waiting for receipt of {0}")]
    Timeout(TxHash),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainPort: Send + Sync {
    /// Current wallet snapshot (native + token). Implementations cache
    /// behind a minimum refresh interval to avoid provider rate limits.
    async fn balances(&self) -> Result<Balance, ChainError>;

    /// Latest block base fee in wei. Fails with `Rpc` when the chain does
    /// not expose EIP-1559 fields; the caller falls back to
    /// `legacy_gas_price`.
    async fn gas_base_fee(&self) -> Result<u128, ChainError>;

    /// Legacy `eth_gasPrice` in wei, for pre-EIP-1559 chains.
    async fn legacy_gas_price(&self) -> Result<u128, ChainError>;

    /// Next transaction nonce for the wallet.
    async fn nonce(&self) -> Result<u64, ChainError>;

    /// Current ERC-20 allowance granted by the wallet to `spender`.
    async fn allowance(&self, spender: Address) -> Result<U256, ChainError>;

    /// Sign and broadcast a transaction. NOT idempotent: a send whose
    /// outcome is unknown must never be blindly retried.
    async fn sign_and_send(&self, intent: TxIntent) -> Result<TxHash, ChainError>;

    /// Poll for the receipt of `hash` until `timeout` elapses.
    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
    ) -> Result<Receipt, ChainError>;

    /// Wallet address the client signs for.
    fn address(&self) -> Address;
}
