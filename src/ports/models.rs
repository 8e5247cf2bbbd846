//! Common data structures shared by all ports

use alloy::primitives::{B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transaction hash as returned by the chain.
pub type TxHash = B256;

/// Wei per whole native unit (18 decimals).
pub const NATIVE_DECIMALS: u32 = 18;

/// Read-only wallet snapshot. Replaced wholesale on each refresh,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Native balance in whole units (ETH).
    pub native: Decimal,
    /// Token balance in whole units.
    pub token: Decimal,
    /// Raw native balance in wei.
    pub native_wei: U256,
    /// Raw token balance in base units.
    pub token_units: U256,
}

impl Balance {
    pub fn from_raw(native_wei: U256, token_units: U256, token_decimals: u8) -> Self {
        Self {
            native: units_to_decimal(native_wei, NATIVE_DECIMALS as u8),
            token: units_to_decimal(token_units, token_decimals),
            native_wei,
            token_units,
        }
    }
}

/// Cached market price snapshot. A snapshot with `token_usd == 0`
/// is invalid and must be discarded by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Token price in USD.
    pub token_usd: Decimal,
    /// Native currency (ETH) price in USD.
    pub native_usd: Decimal,
    /// Token price expressed in native units.
    pub token_per_native: Decimal,
    /// When the underlying feed was queried.
    pub fetched_at: DateTime<Utc>,
}

impl PriceSnapshot {
    /// All fields non-negative and the token price strictly positive.
    pub fn is_valid(&self) -> bool {
        self.token_usd > Decimal::ZERO
            && self.native_usd >= Decimal::ZERO
            && self.token_per_native >= Decimal::ZERO
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }
}

/// Outcome of waiting for a transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Execution status: true = success, false = reverted.
    pub success: bool,
    pub gas_used: u64,
}

/// A fully specified transaction intent handed to the chain client for
/// signing and broadcast. The gas fields must come verbatim from the
/// GasQuote used for the economic decision.
#[derive(Debug, Clone)]
pub struct TxIntent {
    pub to: alloy::primitives::Address,
    pub value: U256,
    pub input: Vec<u8>,
    pub gas_limit: u64,
    pub fee_cap_wei: u128,
    pub priority_fee_wei: u128,
}

/// Convert raw base units into whole units as a Decimal.
///
/// Balances in practice fit comfortably in i128 (2^127 wei is ~1.7e20 ETH);
/// anything larger saturates to Decimal::MAX rather than panicking.
pub fn units_to_decimal(raw: U256, decimals: u8) -> Decimal {
    match i128::try_from(raw) {
        Ok(v) => Decimal::try_from_i128_with_scale(v, decimals as u32)
            .map(|d| d.normalize())
            .unwrap_or(Decimal::MAX),
        Err(_) => Decimal::MAX,
    }
}

/// Convert whole units into raw base units, truncating sub-unit dust.
pub fn decimal_to_units(amount: Decimal, decimals: u8) -> U256 {
    if amount <= Decimal::ZERO {
        return U256::ZERO;
    }
    // Truncate first: rescale alone rounds, and rounding up would
    // promise more than the wallet holds.
    let mut scaled = amount.trunc_with_scale(decimals as u32);
    scaled.rescale(decimals as u32);
    let mantissa = scaled.mantissa();
    if mantissa <= 0 {
        U256::ZERO
    } else {
        U256::from(mantissa as u128)
    }
}
