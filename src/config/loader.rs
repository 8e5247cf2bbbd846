//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching
//! config/default.toml structure. The signing key is deliberately NOT
//! part of the config; it is injected through the environment only.

use std::path::Path;
use std::time::Duration;

use alloy::primitives::Address;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::adapters::aggregator::AggregatorConfig;
use crate::adapters::price_feed::PriceFeedConfig;
use crate::domain::gas_policy::GasPolicy;
use crate::strategy::StrategyParams;

/// Main configuration structure matching config/default.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: ChainSection,
    pub tokens: TokensSection,
    pub aggregator: AggregatorSection,
    pub price_feed: PriceFeedSection,
    pub gas: GasSection,
    pub strategy: StrategySection,
    #[serde(default)]
    pub events: EventsSection,
    pub state: StateSection,
}

/// Chain RPC configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSection {
    /// JSON-RPC endpoint (use a private endpoint for production)
    pub rpc_url: String,
    pub chain_id: u64,
    /// Block explorer base URL, for log links
    #[serde(default)]
    pub explorer_url: String,
    /// Minimum seconds between on-chain balance refreshes
    #[serde(default = "default_balance_refresh_secs")]
    pub balance_refresh_secs: u64,
}

fn default_balance_refresh_secs() -> u64 {
    5
}

impl ChainSection {
    /// RPC URL with environment variable override.
    /// Checks ANCHORBOT_RPC_URL first, falls back to the config value.
    pub fn get_rpc_url(&self) -> String {
        std::env::var("ANCHORBOT_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }
}

/// Traded token configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct TokensSection {
    /// ERC-20 contract address of the traded token
    pub token_address: String,
    /// Ticker symbol (for logging)
    pub symbol: String,
    pub decimals: u8,
}

impl TokensSection {
    pub fn address(&self) -> Result<Address, ConfigError> {
        self.token_address.parse().map_err(|e| {
            ConfigError::ValidationError(format!("token_address is not a valid address: {e}"))
        })
    }
}

/// DEX aggregator API configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorSection {
    /// Aggregator quote API base URL
    pub api_url: String,
    /// Optional API key for higher rate limits
    #[serde(default)]
    pub api_key: Option<String>,
    /// Slippage tolerance in basis points (0.5% = 50 bps)
    pub slippage_bps: u16,
    /// Gas units assumed for a swap
    pub swap_gas_units: u64,
    /// Gas units assumed for an ERC-20 approval
    pub approve_gas_units: u64,
}

impl AggregatorSection {
    /// API key with environment variable fallback.
    /// Checks AGGREGATOR_API_KEY if the config value is empty/None.
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var("AGGREGATOR_API_KEY").ok()
    }
}

/// Price feed configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct PriceFeedSection {
    pub api_url: String,
    /// Chain slug the feed uses, e.g. "ethereum"
    pub chain_slug: String,
    /// Fast cache tier for the trading loop, seconds
    pub fast_ttl_secs: u64,
    /// Slow cache tier for the native reference price, seconds
    pub slow_ttl_secs: u64,
    /// Hard staleness ceiling, seconds
    pub max_stale_secs: u64,
}

/// Gas policy configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct GasSection {
    /// Headroom over the base fee in basis points (1250 = 12.5%)
    pub headroom_bps: u32,
    /// Flat priority fee (tip) in gwei
    pub priority_fee_gwei: f64,
    /// Absolute fee-cap ceiling in gwei
    pub max_fee_gwei: f64,
    /// Buffer over the legacy gas price fallback, basis points
    pub legacy_buffer_bps: u32,
    /// Skip trades whose estimated gas cost exceeds this many USD
    pub gas_usd_cap: f64,
}

/// Strategy configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    /// Sell when price gains this fraction over the anchor (0.10 = 10%)
    pub sell_gain_pct: f64,
    /// Rebuy when price drops this fraction below the anchor
    pub rebuy_drop_pct: f64,
    /// USD value of native currency never spent on buys
    pub reserve_usd: f64,
    /// Token balances at or below this are treated as dust
    pub dust_token: f64,
    /// Polling interval in seconds
    pub tick_interval_secs: u64,
    /// How long to wait for a trade receipt, seconds
    pub receipt_timeout_secs: u64,
}

/// Event feed configuration section (optional)
#[derive(Debug, Clone, Deserialize)]
pub struct EventsSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Interval for periodic price/balance broadcasts, seconds
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_broadcast_interval_secs() -> u64 {
    5
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_bind_addr(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
        }
    }
}

/// State persistence configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StateSection {
    /// Directory for anchor state and trading statistics
    pub data_dir: String,
}

impl StateSection {
    pub fn expanded_data_dir(&self) -> String {
        shellexpand::tilde(&self.data_dir).to_string()
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

const GWEI: f64 = 1e9;

fn dec(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "rpc_url cannot be empty".to_string(),
            ));
        }

        self.tokens.address()?;

        if self.aggregator.api_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "aggregator api_url cannot be empty".to_string(),
            ));
        }

        if self.aggregator.slippage_bps > 1_000 {
            return Err(ConfigError::ValidationError(format!(
                "slippage_bps must be <= 1000 (10%), got {}",
                self.aggregator.slippage_bps
            )));
        }

        if self.aggregator.swap_gas_units == 0 || self.aggregator.approve_gas_units == 0 {
            return Err(ConfigError::ValidationError(
                "swap_gas_units and approve_gas_units must be > 0".to_string(),
            ));
        }

        if self.strategy.sell_gain_pct <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "sell_gain_pct must be > 0, got {}",
                self.strategy.sell_gain_pct
            )));
        }

        if self.strategy.rebuy_drop_pct <= 0.0 || self.strategy.rebuy_drop_pct >= 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "rebuy_drop_pct must be in (0, 1), got {}",
                self.strategy.rebuy_drop_pct
            )));
        }

        if self.strategy.reserve_usd < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "reserve_usd must be >= 0, got {}",
                self.strategy.reserve_usd
            )));
        }

        if self.strategy.tick_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tick_interval_secs must be > 0".to_string(),
            ));
        }

        if self.gas.gas_usd_cap <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "gas_usd_cap must be > 0, got {}",
                self.gas.gas_usd_cap
            )));
        }

        if self.gas.max_fee_gwei < self.gas.priority_fee_gwei {
            return Err(ConfigError::ValidationError(format!(
                "max_fee_gwei ({}) must be >= priority_fee_gwei ({})",
                self.gas.max_fee_gwei, self.gas.priority_fee_gwei
            )));
        }

        if self.price_feed.max_stale_secs < self.price_feed.fast_ttl_secs {
            return Err(ConfigError::ValidationError(
                "max_stale_secs must be >= fast_ttl_secs".to_string(),
            ));
        }

        if self.state.data_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "data_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn gas_policy(&self) -> GasPolicy {
        GasPolicy::new(
            self.gas.headroom_bps,
            (self.gas.priority_fee_gwei * GWEI) as u128,
            (self.gas.max_fee_gwei * GWEI) as u128,
            self.gas.legacy_buffer_bps,
            dec(self.gas.gas_usd_cap),
        )
    }

    pub fn strategy_params(&self, paper: bool) -> StrategyParams {
        StrategyParams {
            sell_gain_pct: dec(self.strategy.sell_gain_pct),
            rebuy_drop_pct: dec(self.strategy.rebuy_drop_pct),
            reserve_usd: dec(self.strategy.reserve_usd),
            dust_token: dec(self.strategy.dust_token),
            slippage_bps: self.aggregator.slippage_bps,
            swap_gas_units: self.aggregator.swap_gas_units,
            receipt_timeout: Duration::from_secs(self.strategy.receipt_timeout_secs),
            token_decimals: self.tokens.decimals,
            paper,
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            api_base_url: self.aggregator.api_url.clone(),
            api_key: self.aggregator.get_api_key(),
            ..Default::default()
        }
    }

    pub fn price_feed_config(&self) -> Result<PriceFeedConfig, ConfigError> {
        Ok(PriceFeedConfig {
            api_base_url: self.price_feed.api_url.clone(),
            chain_slug: self.price_feed.chain_slug.clone(),
            token: self.tokens.address()?,
            fast_ttl: Duration::from_secs(self.price_feed.fast_ttl_secs),
            slow_ttl: Duration::from_secs(self.price_feed.slow_ttl_secs),
            max_stale: Duration::from_secs(self.price_feed.max_stale_secs),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec as rdec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[chain]
rpc_url = "https://eth.llamarpc.com"
chain_id = 1
explorer_url = "https://etherscan.io"
balance_refresh_secs = 5

[tokens]
token_address = "0x6982508145454Ce325dDbE47a25d4ec3d2311933"
symbol = "PEPE"
decimals = 18

[aggregator]
api_url = "https://api.0x.org/swap/v1"
slippage_bps = 50
swap_gas_units = 250000
approve_gas_units = 60000

[price_feed]
api_url = "https://api.dexscreener.com/latest/dex"
chain_slug = "ethereum"
fast_ttl_secs = 2
slow_ttl_secs = 60
max_stale_secs = 120

[gas]
headroom_bps = 1250
priority_fee_gwei = 2.0
max_fee_gwei = 200.0
legacy_buffer_bps = 2000
gas_usd_cap = 5.0

[strategy]
sell_gain_pct = 0.10
rebuy_drop_pct = 0.10
reserve_usd = 10.0
dust_token = 0.000001
tick_interval_secs = 10
receipt_timeout_secs = 120

[events]
enabled = true
bind_addr = "127.0.0.1:8080"
broadcast_interval_secs = 5

[state]
data_dir = "~/.anchorbot"
"#
        .to_string()
    }

    fn config_with(replace: &str, with: &str) -> Result<Config, ConfigError> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(create_valid_config().replace(replace, with).as_bytes())
            .unwrap();
        load_config(file.path())
    }

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(create_valid_config().as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chain.chain_id, 1);
        assert_eq!(config.tokens.symbol, "PEPE");
        assert_eq!(config.aggregator.slippage_bps, 50);
        assert_eq!(config.strategy.tick_interval_secs, 10);
        assert!(config.events.enabled);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_invalid_token_address() {
        let result = config_with(
            "0x6982508145454Ce325dDbE47a25d4ec3d2311933",
            "not-an-address",
        );
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_invalid_rebuy_drop() {
        let result = config_with("rebuy_drop_pct = 0.10", "rebuy_drop_pct = 1.5");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_excessive_slippage() {
        let result = config_with("slippage_bps = 50", "slippage_bps = 5000");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_fee_cap_below_tip() {
        let result = config_with("max_fee_gwei = 200.0", "max_fee_gwei = 1.0");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_events_section_optional() {
        let full = create_valid_config();
        let without_events = full
            .replace("[events]", "")
            .replace("enabled = true", "")
            .replace("bind_addr = \"127.0.0.1:8080\"", "")
            .replace("broadcast_interval_secs = 5", "");

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(without_events.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(!config.events.enabled);
        assert_eq!(config.events.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn test_gas_policy_conversion() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(create_valid_config().as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();

        // 10 gwei base, 12.5% headroom + 2 gwei tip = 13.25 gwei cap.
        let quote = config.gas_policy().quote_eip1559(10_000_000_000, 250_000);
        assert_eq!(quote.fee_cap_wei, 13_250_000_000);
        assert_eq!(quote.priority_fee_wei, 2_000_000_000);
    }

    #[test]
    fn test_strategy_params_conversion() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(create_valid_config().as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();

        let params = config.strategy_params(false);
        assert_eq!(params.sell_gain_pct, rdec!(0.1));
        assert_eq!(params.reserve_usd, rdec!(10));
        assert_eq!(params.receipt_timeout, Duration::from_secs(120));
        assert!(!params.paper);
    }

    #[test]
    fn test_data_dir_tilde_expansion() {
        let section = StateSection {
            data_dir: "~/.anchorbot".to_string(),
        };
        assert!(!section.expanded_data_dir().starts_with('~'));
    }
}
