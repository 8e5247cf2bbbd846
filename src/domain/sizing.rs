//! Buy sizing and the reserve rule
//!
//! The configured reserve is USD-denominated and converted to native
//! units at the current price. Every buy sizing subtracts the reserve
//! and the estimated gas cost before computing the spendable amount;
//! a non-positive result means skip, never a submitted transaction.

use rust_decimal::Decimal;

use crate::ports::models::PriceSnapshot;

/// Native amount available for a buy, or `None` when the balance cannot
/// cover reserve + gas.
pub fn spendable_native(
    native_balance: Decimal,
    reserve_usd: Decimal,
    estimated_gas_native: Decimal,
    snapshot: &PriceSnapshot,
) -> Option<Decimal> {
    if snapshot.native_usd <= Decimal::ZERO {
        return None;
    }
    let reserve_native = reserve_usd / snapshot.native_usd;
    let spendable = native_balance - reserve_native - estimated_gas_native;
    if spendable > Decimal::ZERO {
        Some(spendable)
    } else {
        None
    }
}

/// Whether a token balance is too small to be worth trading.
pub fn is_dust(token_balance: Decimal, dust_threshold: Decimal) -> bool {
    token_balance <= dust_threshold
}
