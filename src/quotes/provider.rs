//! Quote provider boundary

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::shared::errors::QuoteError;
use crate::shared::types::Quote;

/// Upstream quoting API consumed by the optimizer. Implementations never
/// execute or sign trades; they only price them.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
        fee_tier: u32,
    ) -> Result<Quote, QuoteError>;
}

/// Raw provider payload. Loosely typed on purpose: the adapter below decides
/// what is acceptable instead of letting defaults leak in.
#[derive(Debug, Deserialize)]
struct RawQuoteResponse {
    #[serde(rename = "outputAmount")]
    output_amount: Option<f64>,
    liquidity: Option<f64>,
    tick: Option<i32>,
}

impl RawQuoteResponse {
    fn into_quote(
        self,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
        fee_tier: u32,
    ) -> Result<Quote, QuoteError> {
        let output_amount = self
            .output_amount
            .ok_or_else(|| QuoteError::MalformedResponse("outputAmount".to_string()))?;
        if !output_amount.is_finite() || output_amount <= 0.0 {
            return Err(QuoteError::MalformedResponse("outputAmount".to_string()));
        }
        if let Some(liquidity) = self.liquidity {
            if !liquidity.is_finite() || liquidity < 0.0 {
                return Err(QuoteError::MalformedResponse("liquidity".to_string()));
            }
        }
        Ok(Quote {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            fee_tier,
            output_amount,
            liquidity: self.liquidity,
            tick: self.tick,
            fetched_at: Utc::now(),
        })
    }
}

/// HTTP quoting API client
pub struct HttpQuoteClient {
    http_client: Client,
    base_url: String,
}

impl HttpQuoteClient {
    /// The client carries no request timeout: provider calls wait
    /// indefinitely and the caller decides how long it is willing to block.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("⚠️ Quote provider is not available: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl QuoteProvider for HttpQuoteClient {
    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
        fee_tier: u32,
    ) -> Result<Quote, QuoteError> {
        let url = format!(
            "{}/quote?tokenIn={}&tokenOut={}&amountIn={}&feeTier={}",
            self.base_url, token_in, token_out, amount_in, fee_tier
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| QuoteError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QuoteError::Provider(format!(
                "quote request for {}/{} returned status {}",
                token_in,
                token_out,
                response.status()
            )));
        }

        let raw: RawQuoteResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::Provider(e.to_string()))?;

        raw.into_quote(token_in, token_out, amount_in, fee_tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_maps_full_payload() {
        let raw: RawQuoteResponse =
            serde_json::from_str(r#"{"outputAmount": 10.05, "liquidity": 1200.0, "tick": -52}"#)
                .unwrap();
        let quote = raw.into_quote("WETH", "USDC", 10.0, 500).unwrap();
        assert_eq!(quote.output_amount, 10.05);
        assert_eq!(quote.liquidity, Some(1200.0));
        assert_eq!(quote.tick, Some(-52));
        assert_eq!(quote.fee_tier, 500);
    }

    #[test]
    fn test_adapter_rejects_missing_output() {
        let raw: RawQuoteResponse = serde_json::from_str(r#"{"liquidity": 1200.0}"#).unwrap();
        let err = raw.into_quote("WETH", "USDC", 10.0, 500).unwrap_err();
        assert!(matches!(err, QuoteError::MalformedResponse(field) if field == "outputAmount"));
    }

    #[test]
    fn test_adapter_rejects_non_positive_output() {
        let raw: RawQuoteResponse = serde_json::from_str(r#"{"outputAmount": 0.0}"#).unwrap();
        assert!(raw.into_quote("WETH", "USDC", 10.0, 500).is_err());
    }

    #[test]
    fn test_adapter_rejects_negative_liquidity() {
        let raw: RawQuoteResponse =
            serde_json::from_str(r#"{"outputAmount": 5.0, "liquidity": -3.0}"#).unwrap();
        let err = raw.into_quote("WETH", "USDC", 10.0, 500).unwrap_err();
        assert!(matches!(err, QuoteError::MalformedResponse(field) if field == "liquidity"));
    }

    #[test]
    fn test_adapter_tolerates_optional_metadata() {
        let raw: RawQuoteResponse = serde_json::from_str(r#"{"outputAmount": 5.0}"#).unwrap();
        let quote = raw.into_quote("WETH", "USDC", 10.0, 3000).unwrap();
        assert_eq!(quote.liquidity, None);
        assert_eq!(quote.tick, None);
    }
}
