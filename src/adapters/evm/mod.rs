//! EVM adapter - JSON-RPC chain access, local signing, ERC-20 bindings

pub mod erc20;
pub mod rpc;
pub mod wallet;

pub use rpc::{EvmChainClient, HttpProvider};
pub use wallet::{Wallet, WalletError, PRIVATE_KEY_ENV};
