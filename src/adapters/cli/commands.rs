//! CLI command definitions
//!
//! Clap surface for the anchorbot binary. Handlers live in `main.rs`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Anchorbot - price-anchored ERC-20/ETH trading bot
#[derive(Parser, Debug)]
#[command(
    name = "anchorbot",
    version = env!("CARGO_PKG_VERSION"),
    about = "Price-anchored ERC-20/ETH trading bot",
    long_about = "Anchorbot trades a single ERC-20 token against ETH through a DEX \
                  aggregator, selling on a fixed gain above its price anchor and \
                  rebuying on a fixed drop below it."
)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the trading loop
    Run(RunCmd),

    /// Show wallet balances, price and anchor state
    Status(StatusCmd),

    /// One-shot: buy the token with a fixed amount of ETH
    Buy(BuyCmd),

    /// One-shot: sell token back to ETH
    Sell(SellCmd),
}

#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log trade decisions without sending transactions
    #[arg(short, long)]
    pub paper: bool,
}

#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct BuyCmd {
    /// ETH to spend, in whole ETH (e.g. 0.25)
    #[arg(value_name = "ETH")]
    pub amount: f64,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub flags: TradeFlags,
}

#[derive(Parser, Debug)]
pub struct SellCmd {
    /// Token amount to sell, in whole tokens
    #[arg(value_name = "TOKEN", required_unless_present = "all")]
    pub amount: Option<f64>,

    /// Sell the entire token balance
    #[arg(long, conflicts_with = "amount")]
    pub all: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub flags: TradeFlags,
}

/// Per-trade overrides shared by `buy` and `sell`.
#[derive(Args, Debug)]
pub struct TradeFlags {
    /// Slippage tolerance in basis points (max 1000 = 10%)
    #[arg(long, value_name = "BPS", value_parser = clap::value_parser!(u16).range(..=1000))]
    pub slippage_bps: Option<u16>,

    /// Gas limit for the swap transaction
    #[arg(long, value_name = "UNITS")]
    pub gas_limit: Option<u64>,

    /// Base-fee headroom in percent
    #[arg(long, value_name = "PCT")]
    pub headroom_pct: Option<f64>,

    /// Priority fee in gwei
    #[arg(long, value_name = "GWEI")]
    pub priority_gwei: Option<f64>,

    /// Fee cap in gwei
    #[arg(long, value_name = "GWEI")]
    pub max_fee_gwei: Option<f64>,

    /// Print the tx hash immediately instead of waiting for the receipt
    #[arg(long)]
    pub no_wait: bool,

    /// Diagnostic: accept any output amount (min_out = 0)
    #[arg(long)]
    pub allow_any_out: bool,

    /// Log the trade without sending it
    #[arg(long)]
    pub paper: bool,
}
