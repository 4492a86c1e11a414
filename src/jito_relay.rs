// Jito block-engine relay client
//
// Single transactions go through the block engine's sendTransaction endpoint.
// Pre-flight checks and node-side retries are disabled: the pipeline simulates
// first and owns the retry/timeout budget itself.

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RelayRegion;
use crate::error::{ArbError, ArbResult};

/// Official Jito tip accounts for mainnet-beta
pub const TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

/// Pick one tip account uniformly at random
pub fn random_tip_account() -> Result<Pubkey> {
    let choice = TIP_ACCOUNTS[fastrand::usize(..TIP_ACCOUNTS.len())];
    Pubkey::from_str(choice).map_err(|e| anyhow::anyhow!("Bad tip account {}: {}", choice, e))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayResponse {
    pub result: Option<String>,
    pub error: Option<RelayError>,
}

/// JSON-RPC body for a single relayed transaction
pub fn send_transaction_request(encoded_tx: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "sendTransaction",
        "params": [
            encoded_tx,
            { "encoding": "base64", "skipPreflight": true, "maxRetries": 0 }
        ]
    })
}

/// Signature from a relay response, or the relay's error
pub fn parse_send_response(response: RelayResponse) -> ArbResult<Signature> {
    if let Some(err) = response.error {
        return Err(ArbError::submission_failed(format!(
            "relay error {}: {}",
            err.code, err.message
        )));
    }

    let sig = response
        .result
        .ok_or_else(|| ArbError::submission_failed("relay returned no signature"))?;

    Signature::from_str(&sig)
        .map_err(|e| ArbError::submission_failed(format!("invalid signature '{}': {}", sig, e)))
}

/// Low-latency submission path
#[async_trait]
pub trait Relay: Send + Sync {
    async fn send_transaction(&self, tx: &VersionedTransaction) -> ArbResult<Signature>;
}

/// Jito block-engine relay
pub struct JitoRelay {
    client: Client,
    base_url: String,
}

impl JitoRelay {
    pub fn new(region: RelayRegion) -> Result<Self> {
        let base_url = region.base_url().to_string();
        info!("🌐 Jito relay endpoint: {}", base_url);

        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(8)).build()?,
            base_url,
        })
    }

    /// Lightweight request that keeps the HTTP connection warm
    pub async fn keep_alive(&self) -> Result<()> {
        let url = format!("{}/api/v1/bundles", self.base_url);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTipAccounts",
            "params": []
        });

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("relay keep-alive returned {}", response.status());
        }
        debug!("💓 Relay keep-alive OK");
        Ok(())
    }
}

#[async_trait]
impl Relay for JitoRelay {
    async fn send_transaction(&self, tx: &VersionedTransaction) -> ArbResult<Signature> {
        let bytes = bincode::serialize(tx)
            .map_err(|e| ArbError::submission_failed(format!("serialize: {}", e)))?;
        let body = send_transaction_request(&BASE64.encode(bytes));

        let url = format!("{}/api/v1/transactions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ArbError::submission_failed(format!("relay request failed: {}", e)))?;

        let status = response.status();
        let parsed: RelayResponse = response.json().await.map_err(|e| {
            ArbError::submission_failed(format!("relay response ({}) unreadable: {}", status, e))
        })?;

        let signature = parse_send_response(parsed)?;
        info!("📤 Relayed transaction: {}", signature);
        Ok(signature)
    }
}
