//! Command-line interface

pub mod commands;

pub use commands::{BuyCmd, CliApp, Command, RunCmd, SellCmd, StatusCmd, TradeFlags};
