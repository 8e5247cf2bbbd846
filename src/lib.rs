//! Anchorbot - price-anchored ERC-20/ETH trading bot
//!
//! Trades a single ERC-20 token against ETH through a DEX aggregator,
//! selling the position on a fixed percentage gain above its price anchor
//! and rebuying on a fixed percentage drop below it.
//!
//! # Modules
//!
//! - `domain`: Core business logic (AnchorState, GasPolicy, sizing, persistence)
//! - `ports`: Trait abstractions (ChainPort, SwapPort, PricePort)
//! - `strategy`: The FLAT/HOLD anchor state machine
//! - `adapters`: External implementations (EVM RPC, aggregator, price feed, CLI)
//! - `events`: Broadcast bus and WebSocket feed
//! - `config`: Configuration loading and validation
//! - `application`: The polling engine

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod events;
pub mod ports;
pub mod strategy;
