//! Aggregator API wire types

use alloy::primitives::{Address, U256};
use serde::Deserialize;

use crate::ports::swap::SwapError;

/// Route returned by `GET /swap/v1/quote`. `data` is hex calldata for
/// the router contract; numeric fields arrive as decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    /// Router contract to call.
    pub to: Address,
    /// Calldata, 0x-prefixed hex.
    pub data: String,
    /// Native value to attach, decimal wei.
    pub value: String,
    /// Aggregator's gas estimate for the route.
    #[serde(default)]
    pub estimated_gas: Option<String>,
    /// Expected output amount in base units, when the API provides it.
    #[serde(default)]
    pub buy_amount: Option<String>,
    /// Contract that must be approved to move the sell token. Falls back
    /// to `to` when absent.
    #[serde(default)]
    pub allowance_target: Option<Address>,
}

impl RouteResponse {
    pub fn calldata(&self) -> Result<Vec<u8>, SwapError> {
        alloy::hex::decode(&self.data)
            .map_err(|e| SwapError::Build(format!("bad route calldata: {e}")))
    }

    pub fn value_wei(&self) -> Result<U256, SwapError> {
        self.value
            .parse()
            .map_err(|e| SwapError::Build(format!("bad route value: {e}")))
    }

    pub fn estimated_gas(&self) -> Result<Option<u64>, SwapError> {
        match &self.estimated_gas {
            None => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|e| SwapError::Build(format!("bad estimatedGas: {e}"))),
        }
    }

    pub fn buy_amount_units(&self) -> Result<Option<U256>, SwapError> {
        match &self.buy_amount {
            None => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|e| SwapError::Build(format!("bad buyAmount: {e}"))),
        }
    }

    pub fn spender(&self) -> Address {
        self.allowance_target.unwrap_or(self.to)
    }
}
