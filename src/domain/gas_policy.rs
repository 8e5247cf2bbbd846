//! Gas policy - bounded EIP-1559 fee computation
//!
//! Applies a headroom multiplier over the base fee so transactions do not
//! get stuck below the next block's true base fee, adds a flat priority
//! fee, and clamps the result to an absolute ceiling so a fee spike can
//! never silently consume a trade's economic value. Callers compare the
//! estimated cost against `gas_usd_cap` and skip the trade when exceeded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ports::chain::{ChainError, ChainPort};
use crate::ports::models::{units_to_decimal, PriceSnapshot, NATIVE_DECIMALS};
use alloy::primitives::U256;

/// Fee parameters for one decision. Derived per tick, never persisted.
/// `estimated_cost_native` is computed from exactly the numbers that get
/// submitted, so estimate and actual params cannot drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasQuote {
    pub fee_cap_wei: u128,
    pub priority_fee_wei: u128,
    pub gas_limit: u64,
    pub estimated_cost_native: Decimal,
}

#[derive(Debug, Clone)]
pub struct GasPolicy {
    /// Headroom over the base fee, in basis points (1250 = 12.5%).
    headroom_bps: u32,
    /// Flat priority fee (tip) in wei.
    priority_fee_wei: u128,
    /// Absolute fee-cap ceiling in wei per gas.
    max_fee_cap_wei: u128,
    /// Multiplier applied to the legacy gas price fallback, in bps.
    legacy_buffer_bps: u32,
    /// Skip the tick when the estimated gas cost exceeds this USD amount.
    gas_usd_cap: Decimal,
}

impl GasPolicy {
    pub fn new(
        headroom_bps: u32,
        priority_fee_wei: u128,
        max_fee_cap_wei: u128,
        legacy_buffer_bps: u32,
        gas_usd_cap: Decimal,
    ) -> Self {
        Self {
            headroom_bps,
            priority_fee_wei,
            max_fee_cap_wei,
            legacy_buffer_bps,
            gas_usd_cap,
        }
    }

    /// Quote from an EIP-1559 base fee.
    pub fn quote_eip1559(&self, base_fee_wei: u128, gas_limit: u64) -> GasQuote {
        let with_headroom = base_fee_wei
            .saturating_mul(10_000 + self.headroom_bps as u128)
            / 10_000;
        let fee_cap = with_headroom
            .saturating_add(self.priority_fee_wei)
            .min(self.max_fee_cap_wei);
        // After clamping, the tip can never exceed the cap.
        let priority = self.priority_fee_wei.min(fee_cap);
        Self::finish(fee_cap, priority, gas_limit)
    }

    /// Quote from a legacy gas price, for chains without EIP-1559 fields.
    pub fn quote_legacy(&self, gas_price_wei: u128, gas_limit: u64) -> GasQuote {
        let buffered = gas_price_wei
            .saturating_mul(10_000 + self.legacy_buffer_bps as u128)
            / 10_000;
        let fee_cap = buffered.min(self.max_fee_cap_wei);
        Self::finish(fee_cap, fee_cap, gas_limit)
    }

    fn finish(fee_cap_wei: u128, priority_fee_wei: u128, gas_limit: u64) -> GasQuote {
        let cost_wei = fee_cap_wei.saturating_mul(gas_limit as u128);
        GasQuote {
            fee_cap_wei,
            priority_fee_wei,
            gas_limit,
            estimated_cost_native: units_to_decimal(U256::from(cost_wei), NATIVE_DECIMALS as u8),
        }
    }

    /// Fetch fee parameters from the chain, preferring EIP-1559 and
    /// falling back to the buffered legacy gas price.
    pub async fn quote(
        &self,
        chain: &dyn ChainPort,
        gas_limit: u64,
    ) -> Result<GasQuote, ChainError> {
        match chain.gas_base_fee().await {
            Ok(base_fee) => Ok(self.quote_eip1559(base_fee, gas_limit)),
            Err(e) => {
                tracing::debug!("Base fee unavailable ({e}), falling back to legacy gas price");
                let price = chain.legacy_gas_price().await?;
                Ok(self.quote_legacy(price, gas_limit))
            }
        }
    }

    /// Estimated gas cost of this quote in USD.
    pub fn cost_usd(&self, quote: &GasQuote, snapshot: &PriceSnapshot) -> Decimal {
        quote.estimated_cost_native * snapshot.native_usd
    }

    /// Whether the quote is economically acceptable for a trade.
    pub fn within_usd_cap(&self, quote: &GasQuote, snapshot: &PriceSnapshot) -> bool {
        self.cost_usd(quote, snapshot) <= self.gas_usd_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn policy() -> GasPolicy {
        GasPolicy::new(
            1_250,             // 12.5% headroom
            2_000_000_000,     // 2 gwei tip
            200_000_000_000,   // 200 gwei ceiling
            2_000,             // 20% legacy buffer
            dec!(5),           // $5 cap
        )
    }

    fn snapshot(native_usd: Decimal) -> PriceSnapshot {
        PriceSnapshot {
            token_usd: dec!(1),
            native_usd,
            token_per_native: dec!(0.0005),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn eip1559_headroom_and_tip() {
        // 10 gwei base * 1.125 + 2 gwei tip = 13.25 gwei
        let quote = policy().quote_eip1559(10_000_000_000, 200_000);
        assert_eq!(quote.fee_cap_wei, 13_250_000_000);
        assert_eq!(quote.priority_fee_wei, 2_000_000_000);
        assert_eq!(quote.gas_limit, 200_000);
        // 13.25 gwei * 200k gas = 0.00265 ETH
        assert_eq!(quote.estimated_cost_native, dec!(0.00265));
    }

    #[test]
    fn fee_cap_is_clamped() {
        // 1000 gwei base would blow past the 200 gwei ceiling.
        let quote = policy().quote_eip1559(1_000_000_000_000, 200_000);
        assert_eq!(quote.fee_cap_wei, 200_000_000_000);
        assert!(quote.priority_fee_wei <= quote.fee_cap_wei);
    }

    #[test]
    fn legacy_fallback_is_buffered_and_clamped() {
        let quote = policy().quote_legacy(10_000_000_000, 100_000);
        assert_eq!(quote.fee_cap_wei, 12_000_000_000); // +20%

        let clamped = policy().quote_legacy(500_000_000_000, 100_000);
        assert_eq!(clamped.fee_cap_wei, 200_000_000_000);
    }

    #[test]
    fn usd_cap_check() {
        let p = policy();
        // 0.00265 ETH at $1000 = $2.65, under the $5 cap.
        let quote = p.quote_eip1559(10_000_000_000, 200_000);
        assert!(p.within_usd_cap(&quote, &snapshot(dec!(1000))));

        // Same quote at $4000 = $10.60, over the cap.
        assert!(!p.within_usd_cap(&quote, &snapshot(dec!(4000))));
    }

    #[tokio::test]
    async fn quote_falls_back_to_legacy() {
        use crate::ports::mocks::MockChain;
        use crate::ports::models::Balance;

        let chain = MockChain::new(Balance::from_raw(U256::ZERO, U256::ZERO, 18)).without_eip1559();
        let quote = policy().quote(&chain, 100_000).await.unwrap();
        // Mock legacy price is 12 gwei; +20% = 14.4 gwei.
        assert_eq!(quote.fee_cap_wei, 14_400_000_000);
    }
}
