//! Aggregator HTTP client
//!
//! Fetches swap routes from the DEX aggregator's quote endpoint. Handles
//! rate limiting (429) with exponential backoff and server errors (5xx)
//! with linear backoff; client errors surface immediately as build
//! failures so the tick can be abandoned.

use std::time::Duration;

use alloy::primitives::U256;
use reqwest::{Client, StatusCode};

use super::types::RouteResponse;
use crate::ports::swap::SwapError;

/// Sell/buy token sentinel for the chain's native currency.
pub const NATIVE_TOKEN: &str = "ETH";

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.0x.org/swap/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorClient {
    config: AggregatorConfig,
    http: Client,
}

impl AggregatorClient {
    pub fn with_config(config: AggregatorConfig) -> Result<Self, SwapError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SwapError::Build(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Fetch a swap route. Token arguments are either a 0x-prefixed
    /// contract address or the native sentinel.
    pub async fn get_route(
        &self,
        sell_token: &str,
        buy_token: &str,
        sell_amount: U256,
        slippage_bps: u16,
    ) -> Result<RouteResponse, SwapError> {
        let url = format!("{}/quote", self.config.api_base_url);

        let mut req = self.http.get(&url).query(&[
            ("sellToken", sell_token),
            ("buyToken", buy_token),
            ("sellAmount", &sell_amount.to_string()),
            ("slippageBps", &slippage_bps.to_string()),
        ]);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("0x-api-key", api_key);
        }

        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| SwapError::Build("Failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| SwapError::Build(e.to_string()))
            })
            .await?;

        self.handle_response(response).await
    }

    async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<reqwest::Response, SwapError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, SwapError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.config.max_retries {
            match request_fn().await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if response.status() == StatusCode::TOO_MANY_REQUESTS {
                        let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                        tracing::warn!(
                            "Aggregator rate limited (429), backing off {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            self.config.max_retries
                        );
                        last_error = Some(SwapError::Build("Rate limit exceeded".into()));
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if response.status().is_server_error() {
                        last_error = Some(SwapError::Build(format!(
                            "Server error: {}",
                            response.status()
                        )));
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                        continue;
                    }

                    // 4xx other than 429: the request itself is bad,
                    // retrying cannot help.
                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SwapError::Build("Max retries exceeded".into())))
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<RouteResponse, SwapError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Build(format!("API error {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| SwapError::Build(format!("Failed to parse route: {e}")))
    }

    pub fn api_base_url(&self) -> &str {
        &self.config.api_base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AggregatorConfig::default();
        assert_eq!(config.api_base_url, "https://api.0x.org/swap/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn client_creation() {
        assert!(AggregatorClient::with_config(AggregatorConfig::default()).is_ok());
    }
}
