//! DEX aggregator adapter - route quoting and swap submission

pub mod client;
pub mod router;
pub mod types;

pub use client::{AggregatorClient, AggregatorConfig, NATIVE_TOKEN};
pub use router::AggregatorRouter;
pub use types::RouteResponse;
