// Jupiter aggregator client: quotes and aggregator-built swap transactions

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ArbError, ArbResult};
use crate::types::Quote;

/// Quote API requests per second (lite tier)
const QUOTE_REQUESTS_PER_SECOND: u32 = 10;

/// Typed view over the fields of a quote response we actually read
#[derive(Debug, Clone, Deserialize)]
pub struct JupiterQuoteResponse {
    #[serde(rename = "inputMint")]
    pub input_mint: String,

    #[serde(rename = "outputMint")]
    pub output_mint: String,

    #[serde(rename = "inAmount")]
    pub in_amount: String,

    #[serde(rename = "outAmount")]
    pub out_amount: Option<String>,

    #[serde(rename = "priceImpactPct", default)]
    pub price_impact_pct: Option<String>,

    #[serde(rename = "routePlan", default)]
    pub route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutePlanStep {
    #[serde(rename = "swapInfo")]
    pub swap_info: SwapInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapInfo {
    #[serde(rename = "ammKey")]
    pub amm_key: String,

    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JupiterSwapRequest {
    #[serde(rename = "quoteResponse")]
    pub quote_response: Value,
    #[serde(rename = "userPublicKey")]
    pub user_public_key: String,
    #[serde(rename = "wrapAndUnwrapSol")]
    pub wrap_and_unwrap_sol: bool,
    #[serde(rename = "dynamicComputeUnitLimit")]
    pub dynamic_compute_unit_limit: bool,
    #[serde(rename = "prioritizationFeeLamports")]
    pub prioritization_fee_lamports: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JupiterSwapResponse {
    #[serde(rename = "swapTransaction")]
    pub swap_transaction: Option<String>,
}

/// Parse a raw quote body into a [`Quote`]
///
/// A body without `outAmount` (or with an unparsable one) is a
/// `QuoteUnavailable`, never a zero-amount quote.
pub fn parse_quote(raw: Value) -> ArbResult<Quote> {
    let parsed: JupiterQuoteResponse = serde_json::from_value(raw.clone())
        .map_err(|e| ArbError::quote_unavailable(format!("malformed quote: {}", e)))?;

    let out_amount = parsed
        .out_amount
        .as_deref()
        .ok_or_else(|| ArbError::quote_unavailable("quote has no outAmount"))?
        .parse::<u64>()
        .map_err(|e| ArbError::quote_unavailable(format!("bad outAmount: {}", e)))?;

    let in_amount = parsed
        .in_amount
        .parse::<u64>()
        .map_err(|e| ArbError::quote_unavailable(format!("bad inAmount: {}", e)))?;

    // Jupiter reports impact as a fraction string ("0.0012" = 0.12%)
    let price_impact_pct = match parsed.price_impact_pct.as_deref() {
        Some(s) => {
            s.parse::<f64>()
                .map_err(|e| ArbError::quote_unavailable(format!("bad priceImpactPct: {}", e)))?
                * 100.0
        }
        None => 0.0,
    };

    Ok(Quote {
        route_label: route_label(&parsed.route_plan),
        input_mint: parsed.input_mint,
        output_mint: parsed.output_mint,
        in_amount,
        out_amount,
        price_impact_pct,
        raw,
    })
}

/// Human-readable route ("Raydium→Orca")
pub fn route_label(route_plan: &[RoutePlanStep]) -> String {
    let labels: Vec<String> = route_plan
        .iter()
        .map(|step| {
            step.swap_info
                .label
                .clone()
                .unwrap_or_else(|| "Unknown DEX".to_string())
        })
        .collect();

    if labels.is_empty() {
        "direct".to_string()
    } else {
        labels.join("→")
    }
}

/// Source of quotes
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64) -> ArbResult<Quote>;
}

/// Source of aggregator-built swap transactions
#[async_trait]
pub trait SwapSource: Send + Sync {
    /// Base64 serialized versioned transaction, `None` when the aggregator has none
    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> ArbResult<Option<String>>;
}

/// Jupiter HTTP client
pub struct JupiterClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    slippage_bps: u16,
    max_accounts: u8,
    timeout: Duration,
    rate_limiter: DefaultDirectRateLimiter,
}

impl JupiterClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.quote_timeout)
            .build()?;

        let per_second = NonZeroU32::new(QUOTE_REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: config.jupiter_api_url.trim_end_matches('/').to_string(),
            api_key: config.jupiter_api_key.clone(),
            slippage_bps: config.slippage_bps,
            max_accounts: config.max_accounts,
            timeout: config.quote_timeout,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("x-api-key", key),
            None => request,
        }
    }
}

#[async_trait]
impl QuoteSource for JupiterClient {
    async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64) -> ArbResult<Quote> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/quote", self.base_url);
        debug!("🔍 Quote: {} {} → {}", amount, input_mint, output_mint);

        let request = self.with_key(self.client.get(&url)).query(&[
            ("inputMint", input_mint.to_string()),
            ("outputMint", output_mint.to_string()),
            ("amount", amount.to_string()),
            ("slippageBps", self.slippage_bps.to_string()),
            ("maxAccounts", self.max_accounts.to_string()),
        ]);

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ArbError::quote_unavailable(format!("quote timeout after {:?}", self.timeout)))?
            .map_err(|e| ArbError::quote_unavailable(format!("quote request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ArbError::quote_unavailable(format!(
                "Jupiter quote error {}: {}",
                status, text
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ArbError::quote_unavailable(format!("quote body: {}", e)))?;

        parse_quote(raw)
    }
}

#[async_trait]
impl SwapSource for JupiterClient {
    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> ArbResult<Option<String>> {
        let url = format!("{}/swap", self.base_url);

        let body = JupiterSwapRequest {
            quote_response: quote.raw.clone(),
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: json!("auto"),
        };

        let request = self.with_key(self.client.post(&url)).json(&body);

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ArbError::build_failed("swap build timeout"))?
            .map_err(|e| ArbError::build_failed(format!("swap request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("❌ Jupiter swap build error {}: {}", status, text);
            return Ok(None);
        }

        let swap: JupiterSwapResponse = response
            .json()
            .await
            .map_err(|e| ArbError::build_failed(format!("swap body: {}", e)))?;

        Ok(swap.swap_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_quote() -> Value {
        json!({
            "inputMint": "So11111111111111111111111111111111111111112",
            "inAmount": "50000000",
            "outputMint": "TokenMint1111111111111111111111111111111111",
            "outAmount": "1000000000",
            "otherAmountThreshold": "995000000",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "priceImpactPct": "0.0025",
            "routePlan": [
                {"swapInfo": {"ammKey": "A", "label": "Raydium"}, "percent": 100},
                {"swapInfo": {"ammKey": "B", "label": "Orca"}, "percent": 100}
            ]
        })
    }

    #[test]
    fn test_parse_quote() {
        let quote = parse_quote(sample_quote()).unwrap();
        assert_eq!(quote.in_amount, 50_000_000);
        assert_eq!(quote.out_amount, 1_000_000_000);
        assert!((quote.price_impact_pct - 0.25).abs() < 1e-9);
        assert_eq!(quote.route_label, "Raydium→Orca");
        // Raw body is preserved for the swap request
        assert_eq!(quote.raw["otherAmountThreshold"], "995000000");
    }

    #[test]
    fn test_missing_out_amount_is_unavailable() {
        let mut raw = sample_quote();
        raw.as_object_mut().unwrap().remove("outAmount");
        assert!(matches!(
            parse_quote(raw),
            Err(ArbError::QuoteUnavailable(_))
        ));
    }

    #[test]
    fn test_garbage_is_unavailable() {
        assert!(matches!(
            parse_quote(json!({"error": "no route"})),
            Err(ArbError::QuoteUnavailable(_))
        ));
    }

    #[test]
    fn test_swap_request_wire_format() {
        let body = JupiterSwapRequest {
            quote_response: sample_quote(),
            user_public_key: "User".to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: json!("auto"),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["wrapAndUnwrapSol"], true);
        assert_eq!(v["dynamicComputeUnitLimit"], true);
        assert_eq!(v["prioritizationFeeLamports"], "auto");
        assert_eq!(v["quoteResponse"]["outAmount"], "1000000000");
    }
}
