//! Anchorbot - price-anchored ERC-20/ETH trading bot

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use anchorbot::adapters::aggregator::{AggregatorClient, AggregatorRouter};
use anchorbot::adapters::cli::{BuyCmd, CliApp, Command, RunCmd, SellCmd, StatusCmd, TradeFlags};
use anchorbot::adapters::evm::{EvmChainClient, Wallet};
use anchorbot::adapters::price_feed::DexScreenerFeed;
use anchorbot::application::Engine;
use anchorbot::config::{load_config, Config};
use anchorbot::domain::gas_policy::GasPolicy;
use anchorbot::domain::persistence::StateStore;
use anchorbot::events::ws::FeedServer;
use anchorbot::events::EventBus;
use anchorbot::ports::chain::{ChainError, ChainPort};
use anchorbot::ports::models::{decimal_to_units, TxHash, NATIVE_DECIMALS};
use anchorbot::ports::price::PricePort;
use anchorbot::ports::swap::{SwapError, SwapPort};
use anchorbot::strategy::ReactiveStrategy;

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets live in .env, never in config.toml.
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug);

    match app.command {
        Command::Run(cmd) => run_command(cmd).await,
        Command::Status(cmd) => status_command(cmd).await,
        Command::Buy(cmd) => buy_command(cmd).await,
        Command::Sell(cmd) => sell_command(cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).init();
}

/// Everything a command needs to talk to the outside world.
struct Stack {
    config: Config,
    chain: Arc<EvmChainClient>,
    router: Arc<AggregatorRouter>,
    feed: Arc<DexScreenerFeed>,
    gas: GasPolicy,
}

fn build_stack(config: Config, gas: GasPolicy, slippage_bps: u16, paper: bool) -> Result<Stack> {
    let wallet = match Wallet::from_env() {
        Ok(w) => w,
        Err(e) if paper => {
            tracing::warn!("{e} - using a throwaway wallet for paper trading");
            Wallet::random()
        }
        Err(e) => return Err(e).context("A signing key is required for live trading"),
    };
    tracing::info!(address = %wallet.address(), "Wallet loaded");

    let token = config.tokens.address()?;
    let chain = Arc::new(
        EvmChainClient::connect(
            &config.chain.get_rpc_url(),
            config.chain.chain_id,
            token,
            config.tokens.decimals,
            Duration::from_secs(config.chain.balance_refresh_secs),
            wallet,
        )
        .context("Failed to connect to the RPC endpoint")?,
    );

    let aggregator = AggregatorClient::with_config(config.aggregator_config())
        .context("Failed to create aggregator client")?;
    let router = Arc::new(AggregatorRouter::new(
        aggregator,
        chain.clone(),
        gas.clone(),
        token,
        slippage_bps,
        config.aggregator.approve_gas_units,
        Duration::from_secs(config.strategy.receipt_timeout_secs),
    ));

    let feed = Arc::new(
        DexScreenerFeed::new(config.price_feed_config()?)
            .context("Failed to create price feed")?,
    );

    Ok(Stack {
        config,
        chain,
        router,
        feed,
        gas,
    })
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        tx.send(true).ok();
    });
    rx
}

async fn run_command(cmd: RunCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;
    let gas = config.gas_policy();
    let slippage = config.aggregator.slippage_bps;
    let stack = build_stack(config, gas, slippage, cmd.paper)?;

    if cmd.paper {
        tracing::warn!("PAPER TRADING MODE - no transactions will be sent");
    }

    let store = StateStore::new(stack.config.state.expanded_data_dir());
    let params = stack.config.strategy_params(cmd.paper);
    let chain: Arc<dyn ChainPort> = stack.chain.clone();
    let prices: Arc<dyn PricePort> = stack.feed.clone();
    let router: Arc<dyn SwapPort> = stack.router.clone();

    let strategy = ReactiveStrategy::init(
        chain.clone(),
        router,
        prices.clone(),
        stack.gas.clone(),
        store,
        params,
    )
    .await
    .context("Failed to initialize strategy")?;

    let bus = EventBus::default();
    let shutdown = shutdown_on_ctrl_c();

    if stack.config.events.enabled {
        let server = FeedServer::bind(bus.clone(), &stack.config.events.bind_addr)
            .await
            .context("Failed to bind the event feed")?;
        tokio::spawn(server.run(shutdown.clone()));
    }

    let engine = Engine::new(
        strategy,
        chain,
        prices,
        bus,
        Duration::from_secs(stack.config.strategy.tick_interval_secs),
        Duration::from_secs(stack.config.events.broadcast_interval_secs),
    );

    engine.run(shutdown).await?;
    tracing::info!("Anchorbot stopped");
    Ok(())
}

async fn status_command(cmd: StatusCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;
    let gas = config.gas_policy();
    let slippage = config.aggregator.slippage_bps;
    let symbol = config.tokens.symbol.clone();
    let stack = build_stack(config, gas, slippage, false)?;

    let balance = stack
        .chain
        .balances()
        .await
        .context("Failed to fetch balances")?;

    println!("Wallet:  {}", stack.chain.address());
    println!("ETH:     {}", balance.native);
    println!("{symbol}:    {}", balance.token);

    match stack.feed.price().await {
        Ok(snapshot) => {
            println!("Price:   ${} ({symbol}), ${} (ETH)", snapshot.token_usd, snapshot.native_usd);
        }
        Err(e) => println!("Price:   unavailable ({e})"),
    }

    let store = StateStore::new(stack.config.state.expanded_data_dir());
    match store.load_state()? {
        Some(state) => {
            let mode = if state.holding { "HOLD" } else { "FLAT" };
            println!("State:   {mode}, anchor ${}", state.anchor_price_usd);
        }
        None => println!("State:   none (first run)"),
    }

    let stats = store.load_stats()?;
    println!(
        "Trades:  {} total, {} ok, {} failed, {} ETH spent, {} ETH received",
        stats.total_trades,
        stats.successes,
        stats.failures,
        stats.native_spent,
        stats.native_received
    );

    Ok(())
}

async fn buy_command(cmd: BuyCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;
    let gas = gas_policy_with_overrides(&config, &cmd.flags);
    let slippage = cmd
        .flags
        .slippage_bps
        .unwrap_or(config.aggregator.slippage_bps);
    let gas_limit = cmd
        .flags
        .gas_limit
        .unwrap_or(config.aggregator.swap_gas_units);
    let stack = build_stack(config, gas, slippage, cmd.flags.paper)?;

    let amount =
        Decimal::from_f64(cmd.amount).context("amount is not a finite number")?;
    if amount <= Decimal::ZERO {
        bail!("amount must be positive");
    }
    let native_wei = decimal_to_units(amount, NATIVE_DECIMALS as u8);

    let snapshot = stack
        .feed
        .price()
        .await
        .context("Price unavailable, refusing to trade")?;
    let quote = stack
        .gas
        .quote(stack.chain.as_ref(), gas_limit)
        .await
        .context("Failed to quote gas")?;

    let min_token_out = if cmd.flags.allow_any_out {
        tracing::warn!("--allow-any-out set: accepting ANY output amount");
        alloy::primitives::U256::ZERO
    } else {
        let expected = amount * snapshot.native_usd / snapshot.token_usd;
        decimal_to_units(
            with_slippage(expected, slippage),
            stack.config.tokens.decimals,
        )
    };

    if cmd.flags.paper {
        println!(
            "[paper] buy: {amount} ETH -> >= {min_token_out} {} units at ${}",
            stack.config.tokens.symbol, snapshot.token_usd
        );
        return Ok(());
    }

    tracing::info!(%amount, slippage_bps = slippage, "Submitting buy");
    let hash = stack.router.buy(native_wei, min_token_out, &quote).await?;
    finish_one_shot(&stack, hash, &cmd.flags).await
}

async fn sell_command(cmd: SellCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;
    let gas = gas_policy_with_overrides(&config, &cmd.flags);
    let slippage = cmd
        .flags
        .slippage_bps
        .unwrap_or(config.aggregator.slippage_bps);
    let gas_limit = cmd
        .flags
        .gas_limit
        .unwrap_or(config.aggregator.swap_gas_units);
    let stack = build_stack(config, gas, slippage, cmd.flags.paper)?;

    let (amount, token_units) = match cmd.amount {
        Some(raw) => {
            let amount = Decimal::from_f64(raw).context("amount is not a finite number")?;
            if amount <= Decimal::ZERO {
                bail!("amount must be positive");
            }
            let units = decimal_to_units(amount, stack.config.tokens.decimals);
            (amount, units)
        }
        None => {
            let balance = stack
                .chain
                .balances()
                .await
                .context("Failed to fetch balances")?;
            if balance.token_units.is_zero() {
                bail!("nothing to sell: token balance is zero");
            }
            (balance.token, balance.token_units)
        }
    };

    let snapshot = stack
        .feed
        .price()
        .await
        .context("Price unavailable, refusing to trade")?;
    let quote = stack
        .gas
        .quote(stack.chain.as_ref(), gas_limit)
        .await
        .context("Failed to quote gas")?;

    let min_native_out = if cmd.flags.allow_any_out {
        tracing::warn!("--allow-any-out set: accepting ANY output amount");
        alloy::primitives::U256::ZERO
    } else {
        let expected = amount * snapshot.token_usd / snapshot.native_usd;
        decimal_to_units(with_slippage(expected, slippage), NATIVE_DECIMALS as u8)
    };

    if cmd.flags.paper {
        println!(
            "[paper] sell: {amount} {} -> >= {min_native_out} wei at ${}",
            stack.config.tokens.symbol, snapshot.token_usd
        );
        return Ok(());
    }

    tracing::info!(%amount, slippage_bps = slippage, "Submitting sell");
    let hash = stack.router.sell(token_units, min_native_out, &quote).await?;
    finish_one_shot(&stack, hash, &cmd.flags).await
}

/// Report the tx hash and, unless `--no-wait`, block on the receipt.
async fn finish_one_shot(stack: &Stack, hash: TxHash, flags: &TradeFlags) -> Result<()> {
    println!("tx: {hash:#x}");
    if let Some(link) = explorer_link(&stack.config, hash) {
        println!("    {link}");
    }

    if flags.no_wait {
        return Ok(());
    }

    let timeout = Duration::from_secs(stack.config.strategy.receipt_timeout_secs);
    match stack.chain.wait_for_receipt(hash, timeout).await {
        Ok(receipt) if receipt.success => {
            println!("confirmed, gas used: {}", receipt.gas_used);
            Ok(())
        }
        Ok(_) => Err(SwapError::Reverted(hash).into()),
        Err(ChainError::Timeout(h)) => {
            bail!("receipt not found within {}s; tx {h:#x} may still confirm", timeout.as_secs())
        }
        Err(e) => Err(e.into()),
    }
}

fn explorer_link(config: &Config, hash: TxHash) -> Option<String> {
    if config.chain.explorer_url.is_empty() {
        return None;
    }
    Some(format!(
        "{}/tx/{hash:#x}",
        config.chain.explorer_url.trim_end_matches('/')
    ))
}

fn gas_policy_with_overrides(config: &Config, flags: &TradeFlags) -> GasPolicy {
    let mut config = config.clone();
    if let Some(pct) = flags.headroom_pct {
        config.gas.headroom_bps = (pct * 100.0) as u32;
    }
    if let Some(gwei) = flags.priority_gwei {
        config.gas.priority_fee_gwei = gwei;
    }
    if let Some(gwei) = flags.max_fee_gwei {
        config.gas.max_fee_gwei = gwei;
    }
    config.gas_policy()
}

fn with_slippage(amount: Decimal, slippage_bps: u16) -> Decimal {
    amount * Decimal::from(10_000u16 - slippage_bps) / Decimal::from(10_000u16)
}
