//! DexScreener price feed
//!
//! Serves `PriceSnapshot`s from a two-tier cache: the full snapshot is
//! cached behind a short fast TTL sized for the trading loop, and the
//! native reference price behind a longer slow TTL since it moves far
//! less than the token. When a refresh fails the last snapshot keeps
//! being served up to a hard staleness ceiling; past that the feed
//! reports `Unavailable` and the strategy skips the tick.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::ports::models::PriceSnapshot;
use crate::ports::price::{PriceError, PricePort};

#[derive(Debug, Clone)]
pub struct PriceFeedConfig {
    pub api_base_url: String,
    /// Chain slug used by the feed, e.g. "ethereum" or "base".
    pub chain_slug: String,
    pub token: Address,
    pub fast_ttl: Duration,
    pub slow_ttl: Duration,
    /// Hard ceiling: a snapshot older than this is never served.
    pub max_stale: Duration,
    pub timeout: Duration,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.dexscreener.com/latest/dex".to_string(),
            chain_slug: "ethereum".to_string(),
            token: Address::ZERO,
            fast_ttl: Duration::from_secs(2),
            slow_ttl: Duration::from_secs(60),
            max_stale: Duration::from_secs(120),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenPairsResponse {
    #[serde(default)]
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: String,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    price_native: Option<String>,
    #[serde(default)]
    liquidity: Option<Liquidity>,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    #[serde(default)]
    usd: Option<f64>,
}

struct Cached {
    snapshot: PriceSnapshot,
    at: Instant,
}

pub struct DexScreenerFeed {
    http: Client,
    config: PriceFeedConfig,
    cache: Mutex<Option<Cached>>,
    native_usd: Mutex<Option<(Instant, Decimal)>>,
}

impl DexScreenerFeed {
    pub fn new(config: PriceFeedConfig) -> Result<Self, PriceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PriceError::Api(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            cache: Mutex::new(None),
            native_usd: Mutex::new(None),
        })
    }

    async fn fetch(&self) -> Result<PriceSnapshot, PriceError> {
        let url = format!(
            "{}/tokens/{:#x}",
            self.config.api_base_url, self.config.token
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| PriceError::Api(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PriceError::Api(format!("feed returned {}", response.status())));
        }
        let body: TokenPairsResponse = response
            .json()
            .await
            .map_err(|e| PriceError::Parse(e.to_string()))?;

        let pairs = body.pairs.unwrap_or_default();
        let pair = select_pair(&pairs, &self.config.chain_slug)
            .ok_or_else(|| PriceError::Parse("no usable pair on target chain".into()))?;
        self.snapshot_from_pair(pair)
    }

    fn snapshot_from_pair(&self, pair: &Pair) -> Result<PriceSnapshot, PriceError> {
        let token_usd = parse_price(pair.price_usd.as_deref())
            .ok_or_else(|| PriceError::Parse("missing priceUsd".into()))?;
        let token_per_native = parse_price(pair.price_native.as_deref());

        // The native reference price moves slowly; reuse the cached value
        // when the pair does not carry priceNative this round.
        let native_usd = match token_per_native {
            Some(tpn) if tpn > Decimal::ZERO => {
                let native = token_usd / tpn;
                *self.native_usd.lock().unwrap_or_else(|e| e.into_inner()) =
                    Some((Instant::now(), native));
                native
            }
            _ => {
                let cached = self.native_usd.lock().unwrap_or_else(|e| e.into_inner());
                match cached.as_ref() {
                    Some((at, native)) if at.elapsed() <= self.config.slow_ttl => *native,
                    _ => {
                        return Err(PriceError::Parse(
                            "no native reference price available".into(),
                        ))
                    }
                }
            }
        };

        let snapshot = PriceSnapshot {
            token_usd,
            native_usd,
            token_per_native: token_per_native.unwrap_or(Decimal::ZERO),
            fetched_at: Utc::now(),
        };
        if !snapshot.is_valid() {
            return Err(PriceError::Parse("feed returned a non-positive price".into()));
        }
        Ok(snapshot)
    }

    fn cached_within(&self, ttl: Duration) -> Option<PriceSnapshot> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .as_ref()
            .filter(|c| c.at.elapsed() <= ttl)
            .map(|c| c.snapshot.clone())
    }

    fn store(&self, snapshot: PriceSnapshot) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(Cached {
            snapshot,
            at: Instant::now(),
        });
    }

    #[cfg(test)]
    fn seed_cache(&self, snapshot: PriceSnapshot, age: Duration) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(Cached {
            snapshot,
            at: Instant::now() - age,
        });
    }
}

#[async_trait]
impl PricePort for DexScreenerFeed {
    async fn price(&self) -> Result<PriceSnapshot, PriceError> {
        if let Some(snapshot) = self.cached_within(self.config.fast_ttl) {
            return Ok(snapshot);
        }

        match self.fetch().await {
            Ok(snapshot) => {
                self.store(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                // Serve stale up to the hard ceiling, never past it.
                if let Some(snapshot) = self.cached_within(self.config.max_stale) {
                    tracing::warn!(error = %e, "Price refresh failed, serving cached snapshot");
                    return Ok(snapshot);
                }
                tracing::warn!(error = %e, "Price refresh failed with no usable cache");
                Err(PriceError::Unavailable(e.to_string()))
            }
        }
    }
}

fn parse_price(raw: Option<&str>) -> Option<Decimal> {
    raw.and_then(|s| s.parse().ok())
}

/// Highest-liquidity pair on the target chain with a usable USD price.
fn select_pair<'a>(pairs: &'a [Pair], chain_slug: &str) -> Option<&'a Pair> {
    pairs
        .iter()
        .filter(|p| p.chain_id == chain_slug)
        .filter(|p| parse_price(p.price_usd.as_deref()).is_some_and(|v| v > Decimal::ZERO))
        .max_by(|a, b| {
            let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            la.total_cmp(&lb)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pairs_json(json: serde_json::Value) -> Vec<Pair> {
        serde_json::from_value::<TokenPairsResponse>(json)
            .unwrap()
            .pairs
            .unwrap_or_default()
    }

    fn snapshot(token_usd: Decimal) -> PriceSnapshot {
        PriceSnapshot {
            token_usd,
            native_usd: dec!(3000),
            token_per_native: dec!(0.0004),
            fetched_at: Utc::now(),
        }
    }

    /// Feed pointed at a closed port: every fetch fails fast.
    fn offline_feed() -> DexScreenerFeed {
        DexScreenerFeed::new(PriceFeedConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            fast_ttl: Duration::from_secs(2),
            slow_ttl: Duration::from_secs(60),
            max_stale: Duration::from_secs(120),
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn picks_highest_liquidity_pair_on_target_chain() {
        let pairs = pairs_json(serde_json::json!({ "pairs": [
            { "chainId": "bsc", "priceUsd": "9.99", "liquidity": { "usd": 9000000.0 } },
            { "chainId": "ethereum", "priceUsd": "1.25", "liquidity": { "usd": 50000.0 } },
            { "chainId": "ethereum", "priceUsd": "1.26", "liquidity": { "usd": 800000.0 } },
        ]}));
        let best = select_pair(&pairs, "ethereum").unwrap();
        assert_eq!(best.price_usd.as_deref(), Some("1.26"));
    }

    #[test]
    fn ignores_pairs_without_usable_price() {
        let pairs = pairs_json(serde_json::json!({ "pairs": [
            { "chainId": "ethereum", "liquidity": { "usd": 800000.0 } },
            { "chainId": "ethereum", "priceUsd": "0", "liquidity": { "usd": 900000.0 } },
        ]}));
        assert!(select_pair(&pairs, "ethereum").is_none());
    }

    #[test]
    fn snapshot_derives_native_price_from_pair() {
        let feed = offline_feed();
        let pairs = pairs_json(serde_json::json!({ "pairs": [
            { "chainId": "ethereum", "priceUsd": "1.20", "priceNative": "0.0004" },
        ]}));
        let snap = feed.snapshot_from_pair(&pairs[0]).unwrap();
        assert_eq!(snap.token_usd, dec!(1.20));
        assert_eq!(snap.native_usd, dec!(3000));
        assert_eq!(snap.token_per_native, dec!(0.0004));
    }

    #[test]
    fn missing_native_price_uses_slow_tier_cache() {
        let feed = offline_feed();
        // Prime the slow tier.
        let primed = pairs_json(serde_json::json!({ "pairs": [
            { "chainId": "ethereum", "priceUsd": "1.20", "priceNative": "0.0004" },
        ]}));
        feed.snapshot_from_pair(&primed[0]).unwrap();

        let bare = pairs_json(serde_json::json!({ "pairs": [
            { "chainId": "ethereum", "priceUsd": "1.30" },
        ]}));
        let snap = feed.snapshot_from_pair(&bare[0]).unwrap();
        assert_eq!(snap.token_usd, dec!(1.30));
        assert_eq!(snap.native_usd, dec!(3000));
    }

    #[test]
    fn missing_native_price_without_cache_is_a_parse_error() {
        let feed = offline_feed();
        let bare = pairs_json(serde_json::json!({ "pairs": [
            { "chainId": "ethereum", "priceUsd": "1.30" },
        ]}));
        assert!(matches!(
            feed.snapshot_from_pair(&bare[0]),
            Err(PriceError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_network() {
        let feed = offline_feed();
        feed.seed_cache(snapshot(dec!(1.11)), Duration::ZERO);
        // Endpoint is unreachable; only the cache can satisfy this.
        let snap = feed.price().await.unwrap();
        assert_eq!(snap.token_usd, dec!(1.11));
    }

    #[tokio::test]
    async fn stale_cache_is_served_after_fetch_failure() {
        let feed = offline_feed();
        feed.seed_cache(snapshot(dec!(1.11)), Duration::from_secs(30));
        let snap = feed.price().await.unwrap();
        assert_eq!(snap.token_usd, dec!(1.11));
    }

    #[tokio::test]
    async fn cache_past_the_ceiling_is_unavailable() {
        let feed = offline_feed();
        feed.seed_cache(snapshot(dec!(1.11)), Duration::from_secs(600));
        assert!(matches!(
            feed.price().await,
            Err(PriceError::Unavailable(_))
        ));
    }
}
