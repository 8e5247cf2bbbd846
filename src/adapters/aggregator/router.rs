//! Swap router - builds and submits aggregator trades
//!
//! Implements `SwapPort` on top of the quote endpoint. The gas
//! parameters of a submitted swap come verbatim from the `GasQuote` the
//! strategy decided with; a route whose gas estimate exceeds that
//! quote's limit is rejected instead of silently re-estimated.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::client::{AggregatorClient, NATIVE_TOKEN};
use super::types::RouteResponse;
use crate::adapters::evm::erc20::approve_calldata;
use crate::domain::gas_policy::{GasPolicy, GasQuote};
use crate::ports::chain::{ChainError, ChainPort};
use crate::ports::models::{TxHash, TxIntent};
use crate::ports::swap::{SwapError, SwapPort};

pub struct AggregatorRouter {
    client: AggregatorClient,
    chain: Arc<dyn ChainPort>,
    gas: GasPolicy,
    token: Address,
    slippage_bps: u16,
    approve_gas_units: u64,
    approval_timeout: Duration,
}

impl AggregatorRouter {
    pub fn new(
        client: AggregatorClient,
        chain: Arc<dyn ChainPort>,
        gas: GasPolicy,
        token: Address,
        slippage_bps: u16,
        approve_gas_units: u64,
        approval_timeout: Duration,
    ) -> Self {
        Self {
            client,
            chain,
            gas,
            token,
            slippage_bps,
            approve_gas_units,
            approval_timeout,
        }
    }

    fn token_param(&self) -> String {
        format!("{:#x}", self.token)
    }

    /// Turn a route into a transaction intent, enforcing that the
    /// aggregator's own gas estimate fits the limit the economic
    /// decision was made with.
    fn build_intent(
        &self,
        route: &RouteResponse,
        quote: &GasQuote,
        min_out: U256,
    ) -> Result<TxIntent, SwapError> {
        if let Some(estimated) = route.estimated_gas()? {
            if estimated > quote.gas_limit {
                return Err(SwapError::Build(format!(
                    "route needs {estimated} gas, limit is {}",
                    quote.gas_limit
                )));
            }
        }
        if let Some(out) = route.buy_amount_units()? {
            if out < min_out {
                return Err(SwapError::Build(format!(
                    "route output {out} below minimum {min_out}"
                )));
            }
        }
        Ok(TxIntent {
            to: route.to,
            value: route.value_wei()?,
            input: route.calldata()?,
            gas_limit: quote.gas_limit,
            fee_cap_wei: quote.fee_cap_wei,
            priority_fee_wei: quote.priority_fee_wei,
        })
    }
}

#[async_trait]
impl SwapPort for AggregatorRouter {
    async fn ensure_allowance(&self, spender: Address, amount: U256) -> Result<(), SwapError> {
        let current = self.chain.allowance(spender).await?;
        if current >= amount {
            return Ok(());
        }

        tracing::info!(%spender, "Allowance too low, submitting approval");
        // Unlimited approval: one transaction covers every future sell
        // through this spender.
        let quote = self
            .gas
            .quote(self.chain.as_ref(), self.approve_gas_units)
            .await?;
        let intent = TxIntent {
            to: self.token,
            value: U256::ZERO,
            input: approve_calldata(spender, U256::MAX),
            gas_limit: self.approve_gas_units,
            fee_cap_wei: quote.fee_cap_wei,
            priority_fee_wei: quote.priority_fee_wei,
        };
        let hash = self.chain.sign_and_send(intent).await?;

        match self.chain.wait_for_receipt(hash, self.approval_timeout).await {
            Ok(receipt) if receipt.success => {
                tracing::info!(tx = %hash, "Approval confirmed");
                Ok(())
            }
            Ok(_) => Err(SwapError::ApprovalFailed(format!("approval {hash:#x} reverted"))),
            Err(ChainError::Timeout(_)) => Err(SwapError::ApprovalFailed(format!(
                "approval {hash:#x} not confirmed in time"
            ))),
            Err(e) => Err(SwapError::Chain(e)),
        }
    }

    async fn buy(
        &self,
        native_wei: U256,
        min_token_out: U256,
        quote: &GasQuote,
    ) -> Result<TxHash, SwapError> {
        let route = self
            .client
            .get_route(NATIVE_TOKEN, &self.token_param(), native_wei, self.slippage_bps)
            .await?;
        let intent = self.build_intent(&route, quote, min_token_out)?;
        Ok(self.chain.sign_and_send(intent).await?)
    }

    async fn sell(
        &self,
        token_units: U256,
        min_native_out: U256,
        quote: &GasQuote,
    ) -> Result<TxHash, SwapError> {
        let route = self
            .client
            .get_route(&self.token_param(), NATIVE_TOKEN, token_units, self.slippage_bps)
            .await?;

        self.ensure_allowance(route.spender(), token_units).await?;

        let intent = self.build_intent(&route, quote, min_native_out)?;
        Ok(self.chain.sign_and_send(intent).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::aggregator::client::AggregatorConfig;
    use crate::ports::mocks::MockChain;
    use crate::ports::models::{Balance, Receipt};
    use rust_decimal_macros::dec;

    fn router(chain: MockChain) -> AggregatorRouter {
        AggregatorRouter::new(
            AggregatorClient::with_config(AggregatorConfig::default()).unwrap(),
            Arc::new(chain),
            GasPolicy::new(1_250, 2_000_000_000, 200_000_000_000, 2_000, dec!(5)),
            Address::from([0x10; 20]),
            50,
            60_000,
            Duration::from_secs(30),
        )
    }

    fn chain() -> MockChain {
        MockChain::new(Balance::from_raw(U256::ZERO, U256::ZERO, 18))
    }

    fn route(estimated_gas: Option<&str>, buy_amount: Option<&str>) -> RouteResponse {
        serde_json::from_value(serde_json::json!({
            "to": "0x1111111111111111111111111111111111111111",
            "data": "0xabcdef",
            "value": "1000",
            "estimatedGas": estimated_gas,
            "buyAmount": buy_amount,
        }))
        .unwrap()
    }

    fn quote() -> GasQuote {
        GasQuote {
            fee_cap_wei: 13_250_000_000,
            priority_fee_wei: 2_000_000_000,
            gas_limit: 250_000,
            estimated_cost_native: dec!(0.0033125),
        }
    }

    #[tokio::test]
    async fn sufficient_allowance_sends_nothing() {
        let chain = chain().with_allowance(U256::MAX);
        let mock = chain.clone();
        let router = router(chain);

        router
            .ensure_allowance(Address::from([0x22; 20]), U256::from(1_000u64))
            .await
            .unwrap();
        assert!(mock.sent_intents().is_empty());
    }

    #[tokio::test]
    async fn short_allowance_submits_unlimited_approval() {
        let chain = chain();
        let mock = chain.clone();
        let router = router(chain);

        router
            .ensure_allowance(Address::from([0x22; 20]), U256::from(1_000u64))
            .await
            .unwrap();

        let sent = mock.sent_intents();
        assert_eq!(sent.len(), 1);
        // Targets the token contract with approve(spender, MAX).
        assert_eq!(sent[0].to, Address::from([0x10; 20]));
        assert_eq!(&sent[0].input[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(sent[0].value, U256::ZERO);
    }

    #[tokio::test]
    async fn reverted_approval_is_an_approval_failure() {
        let chain = chain();
        chain.push_receipt(Ok(Receipt {
            success: false,
            gas_used: 60_000,
        }));
        let router = router(chain);

        let err = router
            .ensure_allowance(Address::from([0x22; 20]), U256::from(1_000u64))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::ApprovalFailed(_)));
    }

    #[test]
    fn oversized_route_gas_is_rejected() {
        let chain = chain();
        let router = router(chain);

        let err = router
            .build_intent(&route(Some("300000"), None), &quote(), U256::ZERO)
            .unwrap_err();
        assert!(matches!(err, SwapError::Build(_)));
    }

    #[test]
    fn route_below_min_out_is_rejected() {
        let router = router(chain());

        let err = router
            .build_intent(&route(None, Some("99")), &quote(), U256::from(100u64))
            .unwrap_err();
        assert!(matches!(err, SwapError::Build(_)));
    }

    #[test]
    fn intent_carries_quote_fees_verbatim() {
        let router = router(chain());
        let q = quote();

        let intent = router
            .build_intent(&route(Some("200000"), Some("500")), &q, U256::from(100u64))
            .unwrap();
        assert_eq!(intent.gas_limit, q.gas_limit);
        assert_eq!(intent.fee_cap_wei, q.fee_cap_wei);
        assert_eq!(intent.priority_fee_wei, q.priority_fee_wei);
        assert_eq!(intent.value, U256::from(1_000u64));
        assert_eq!(intent.input, vec![0xab, 0xcd, 0xef]);
    }
}
