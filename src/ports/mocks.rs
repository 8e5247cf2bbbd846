//! Recording mocks for the ports, used by strategy unit tests and the
//! integration tests in `tests/`. Each mock records every call and pops
//! scripted responses, so tests can assert both what was invoked and
//! what was never invoked.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use super::chain::{ChainError, ChainPort};
use super::models::{Balance, PriceSnapshot, Receipt, TxHash, TxIntent};
use super::price::{PriceError, PricePort};
use super::swap::{SwapError, SwapPort};
use crate::domain::gas_policy::GasQuote;

/// Deterministic fake tx hash for scripted sends.
pub fn test_hash(n: u64) -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    B256::from(bytes)
}

/// Scripted chain client.
#[derive(Clone)]
pub struct MockChain {
    balance: Arc<Mutex<Balance>>,
    base_fee: Arc<Mutex<Option<u128>>>,
    legacy_price: Arc<Mutex<Option<u128>>>,
    allowance: Arc<Mutex<U256>>,
    receipts: Arc<Mutex<VecDeque<Result<Receipt, ChainError>>>>,
    sent: Arc<Mutex<Vec<TxIntent>>>,
    next_hash: Arc<Mutex<u64>>,
}

impl MockChain {
    pub fn new(balance: Balance) -> Self {
        Self {
            balance: Arc::new(Mutex::new(balance)),
            base_fee: Arc::new(Mutex::new(Some(10_000_000_000))), // 10 gwei
            legacy_price: Arc::new(Mutex::new(Some(12_000_000_000))),
            allowance: Arc::new(Mutex::new(U256::ZERO)),
            receipts: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            next_hash: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_base_fee(self, wei: u128) -> Self {
        *self.base_fee.lock().unwrap() = Some(wei);
        self
    }

    /// Simulate a pre-EIP-1559 chain: `gas_base_fee` fails.
    pub fn without_eip1559(self) -> Self {
        *self.base_fee.lock().unwrap() = None;
        self
    }

    pub fn with_allowance(self, amount: U256) -> Self {
        *self.allowance.lock().unwrap() = amount;
        self
    }

    pub fn set_balance(&self, balance: Balance) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn push_receipt(&self, receipt: Result<Receipt, ChainError>) {
        self.receipts.lock().unwrap().push_back(receipt);
    }

    pub fn sent_intents(&self) -> Vec<TxIntent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainPort for MockChain {
    async fn balances(&self) -> Result<Balance, ChainError> {
        Ok(self.balance.lock().unwrap().clone())
    }

    async fn gas_base_fee(&self) -> Result<u128, ChainError> {
        self.base_fee
            .lock()
            .unwrap()
            .ok_or_else(|| ChainError::Rpc("no EIP-1559 base fee".into()))
    }

    async fn legacy_gas_price(&self) -> Result<u128, ChainError> {
        self.legacy_price
            .lock()
            .unwrap()
            .ok_or_else(|| ChainError::Rpc("no gas price".into()))
    }

    async fn allowance(&self, _spender: Address) -> Result<U256, ChainError> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn nonce(&self) -> Result<u64, ChainError> {
        // Next nonce equals the number of sends so far.
        Ok(self.sent.lock().unwrap().len() as u64)
    }

    async fn sign_and_send(&self, intent: TxIntent) -> Result<TxHash, ChainError> {
        self.sent.lock().unwrap().push(intent);
        let mut n = self.next_hash.lock().unwrap();
        *n += 1;
        Ok(test_hash(*n))
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        _timeout: Duration,
    ) -> Result<Receipt, ChainError> {
        match self.receipts.lock().unwrap().pop_front() {
            Some(r) => r,
            None => {
                let _ = hash;
                Ok(Receipt {
                    success: true,
                    gas_used: 180_000,
                })
            }
        }
    }

    fn address(&self) -> Address {
        Address::from([0xAA; 20])
    }
}

/// One recorded swap-port invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapCall {
    EnsureAllowance { spender: Address, amount: U256 },
    Buy { native_wei: U256, min_token_out: U256 },
    Sell { token_units: U256, min_native_out: U256 },
}

/// Scripted swap router. Results are consumed front-to-back; with no
/// script configured every call succeeds.
#[derive(Clone, Default)]
pub struct MockSwapRouter {
    calls: Arc<Mutex<Vec<SwapCall>>>,
    results: Arc<Mutex<VecDeque<Result<TxHash, SwapError>>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    next_hash: Arc<Mutex<u64>>,
}

impl MockSwapRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: Result<TxHash, SwapError>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Make every swap call take `delay` before resolving, to exercise
    /// the one-trade-in-flight guarantee.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<SwapCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn swap_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, SwapCall::EnsureAllowance { .. }))
            .count()
    }

    async fn resolve(&self) -> Result<TxHash, SwapError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        match self.results.lock().unwrap().pop_front() {
            Some(r) => r,
            None => {
                let mut n = self.next_hash.lock().unwrap();
                *n += 1;
                Ok(test_hash(1000 + *n))
            }
        }
    }
}

#[async_trait]
impl SwapPort for MockSwapRouter {
    async fn ensure_allowance(&self, spender: Address, amount: U256) -> Result<(), SwapError> {
        self.calls
            .lock()
            .unwrap()
            .push(SwapCall::EnsureAllowance { spender, amount });
        Ok(())
    }

    async fn buy(
        &self,
        native_wei: U256,
        min_token_out: U256,
        _quote: &GasQuote,
    ) -> Result<TxHash, SwapError> {
        self.calls.lock().unwrap().push(SwapCall::Buy {
            native_wei,
            min_token_out,
        });
        self.resolve().await
    }

    async fn sell(
        &self,
        token_units: U256,
        min_native_out: U256,
        _quote: &GasQuote,
    ) -> Result<TxHash, SwapError> {
        self.calls.lock().unwrap().push(SwapCall::Sell {
            token_units,
            min_native_out,
        });
        self.resolve().await
    }
}

/// Scripted price feed: pops queued responses, then keeps serving the
/// sticky snapshot if one was set.
#[derive(Clone, Default)]
pub struct MockPriceFeed {
    queue: Arc<Mutex<VecDeque<Result<PriceSnapshot, PriceError>>>>,
    sticky: Arc<Mutex<Option<PriceSnapshot>>>,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(self, snapshot: PriceSnapshot) -> Self {
        *self.sticky.lock().unwrap() = Some(snapshot);
        self
    }

    pub fn push(&self, response: Result<PriceSnapshot, PriceError>) {
        self.queue.lock().unwrap().push_back(response);
    }

    pub fn set_sticky(&self, snapshot: PriceSnapshot) {
        *self.sticky.lock().unwrap() = Some(snapshot);
    }
}

#[async_trait]
impl PricePort for MockPriceFeed {
    async fn price(&self) -> Result<PriceSnapshot, PriceError> {
        if let Some(r) = self.queue.lock().unwrap().pop_front() {
            return r;
        }
        self.sticky
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PriceError::Unavailable("no snapshot configured".into()))
    }
}
