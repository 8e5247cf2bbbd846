//! Strategy layer - trading decision logic

pub mod reactive;

pub use reactive::{ReactiveStrategy, SkipReason, StrategyError, StrategyParams, TickOutcome};
