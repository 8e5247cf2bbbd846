//! EVM chain client
//!
//! `ChainPort` implementation over a JSON-RPC HTTP provider: balance
//! reads (cached behind a minimum refresh interval), fee parameters,
//! allowance reads and EIP-1559 transaction signing and broadcast.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::eip2930::AccessList;
use alloy::network::{Ethereum, TxSignerSync};
use alloy::primitives::{Address, TxKind, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::BlockNumberOrTag;
use async_trait::async_trait;
use url::Url;

use super::erc20::IERC20;
use super::wallet::Wallet;
use crate::ports::chain::{ChainError, ChainPort};
use crate::ports::models::{Balance, Receipt, TxHash, TxIntent};

pub type HttpProvider = RootProvider<Ethereum>;

const READ_ATTEMPTS: u32 = 3;
const READ_BACKOFF: Duration = Duration::from_millis(200);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct EvmChainClient {
    provider: HttpProvider,
    wallet: Wallet,
    chain_id: u64,
    token: Address,
    token_decimals: u8,
    balance_min_interval: Duration,
    balance_cache: Mutex<Option<(Instant, Balance)>>,
}

impl EvmChainClient {
    pub fn connect(
        rpc_url: &str,
        chain_id: u64,
        token: Address,
        token_decimals: u8,
        balance_min_interval: Duration,
        wallet: Wallet,
    ) -> Result<Self, ChainError> {
        let url =
            Url::parse(rpc_url).map_err(|e| ChainError::Rpc(format!("invalid RPC URL: {e}")))?;
        Ok(Self {
            provider: RootProvider::new_http(url),
            wallet,
            chain_id,
            token,
            token_decimals,
            balance_min_interval,
            balance_cache: Mutex::new(None),
        })
    }

    /// Retry transient read failures a few times before giving up.
    /// Writes are never retried here; `sign_and_send` is not idempotent.
    async fn retry_read<T, E, F, Fut>(what: &str, mut op: F) -> Result<T, ChainError>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last = String::new();
        for attempt in 0..READ_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(READ_BACKOFF).await;
            }
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    last = e.to_string();
                    tracing::debug!(what, attempt, error = %last, "RPC read failed");
                }
            }
        }
        Err(ChainError::Rpc(format!("{what}: {last}")))
    }

    async fn fetch_balances(&self) -> Result<Balance, ChainError> {
        let address = self.wallet.address();

        let provider = self.provider.clone();
        let native_wei = Self::retry_read("native balance", move || {
            let provider = provider.clone();
            async move { provider.get_balance(address).await }
        })
        .await?;

        let token = IERC20::new(self.token, self.provider.clone());
        let token_units = Self::retry_read("token balance", move || {
            let token = token.clone();
            async move { token.balanceOf(address).call().await }
        })
        .await?;

        Ok(Balance::from_raw(
            native_wei,
            token_units,
            self.token_decimals,
        ))
    }
}

/// Map a broadcast failure onto the error taxonomy by sniffing the
/// node's message. Providers do not agree on error codes, the message
/// text is the only portable signal.
fn classify_send_error(message: String) -> ChainError {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        ChainError::InsufficientFunds(message)
    } else if lower.contains("nonce") {
        ChainError::Nonce(message)
    } else {
        ChainError::Rpc(message)
    }
}

#[async_trait]
impl ChainPort for EvmChainClient {
    async fn balances(&self) -> Result<Balance, ChainError> {
        {
            let cache = self.balance_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((at, balance)) = cache.as_ref() {
                if at.elapsed() < self.balance_min_interval {
                    return Ok(balance.clone());
                }
            }
        }

        let balance = self.fetch_balances().await?;
        let mut cache = self.balance_cache.lock().unwrap_or_else(|e| e.into_inner());
        *cache = Some((Instant::now(), balance.clone()));
        Ok(balance)
    }

    async fn gas_base_fee(&self) -> Result<u128, ChainError> {
        let provider = self.provider.clone();
        let history = Self::retry_read("fee history", move || {
            let provider = provider.clone();
            async move {
                provider
                    .get_fee_history(1, BlockNumberOrTag::Latest, &[])
                    .await
            }
        })
        .await?;

        history
            .latest_block_base_fee()
            .filter(|fee| *fee > 0)
            .ok_or_else(|| ChainError::Rpc("chain reports no EIP-1559 base fee".into()))
    }

    async fn legacy_gas_price(&self) -> Result<u128, ChainError> {
        let provider = self.provider.clone();
        Self::retry_read("gas price", move || {
            let provider = provider.clone();
            async move { provider.get_gas_price().await }
        })
        .await
    }

    async fn allowance(&self, spender: Address) -> Result<U256, ChainError> {
        let owner = self.wallet.address();
        let token = IERC20::new(self.token, self.provider.clone());
        Self::retry_read("allowance", move || {
            let token = token.clone();
            async move { token.allowance(owner, spender).call().await }
        })
        .await
    }

    async fn nonce(&self) -> Result<u64, ChainError> {
        let address = self.wallet.address();
        let provider = self.provider.clone();
        Self::retry_read("nonce", move || {
            let provider = provider.clone();
            async move { provider.get_transaction_count(address).await }
        })
        .await
    }

    async fn sign_and_send(&self, intent: TxIntent) -> Result<TxHash, ChainError> {
        let nonce = self.nonce().await?;

        // Preflight the worst-case cost so an obviously unfunded send is
        // rejected locally instead of burning an RPC round trip.
        let max_cost = intent
            .value
            .saturating_add(U256::from(intent.fee_cap_wei).saturating_mul(U256::from(
                intent.gas_limit,
            )));
        let balance = self.balances().await?;
        if balance.native_wei < max_cost {
            return Err(ChainError::InsufficientFunds(format!(
                "need {max_cost} wei, have {} wei",
                balance.native_wei
            )));
        }

        let mut tx = alloy::consensus::TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas: intent.priority_fee_wei,
            max_fee_per_gas: intent.fee_cap_wei,
            gas_limit: intent.gas_limit,
            to: TxKind::Call(intent.to),
            value: intent.value,
            access_list: AccessList::default(),
            input: intent.input.into(),
        };

        let sig = TxSignerSync::sign_transaction_sync(self.wallet.signer(), &mut tx)
            .map_err(|e| ChainError::Rpc(format!("signing failed: {e}")))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        let hash = *signed.tx_hash();
        let raw = signed.encoded_2718();

        self.provider
            .send_raw_transaction(raw.as_slice())
            .await
            .map_err(|e| classify_send_error(e.to_string()))?;

        // The cached balance is stale the moment a tx is in flight.
        *self.balance_cache.lock().unwrap_or_else(|e| e.into_inner()) = None;

        tracing::info!(tx = %hash, nonce, "Transaction broadcast");
        Ok(hash)
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        timeout: Duration,
    ) -> Result<Receipt, ChainError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    return Ok(Receipt {
                        success: receipt.status(),
                        gas_used: receipt.gas_used,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(tx = %hash, error = %e, "Receipt poll failed");
                }
            }
            if Instant::now() >= deadline {
                return Err(ChainError::Timeout(hash));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    fn address(&self) -> Address {
        self.wallet.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_errors_are_classified() {
        assert!(matches!(
            classify_send_error("insufficient funds for gas * price + value".into()),
            ChainError::InsufficientFunds(_)
        ));
        assert!(matches!(
            classify_send_error("nonce too low".into()),
            ChainError::Nonce(_)
        ));
        assert!(matches!(
            classify_send_error("connection reset by peer".into()),
            ChainError::Rpc(_)
        ));
    }
}
