// Polled REST discovery feed (trending / new-token lists)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{parse_tokens, DiscoveredToken, DiscoveryFeed};

pub struct RestDiscoveryFeed {
    name: String,
    url: String,
    client: Client,
}

impl RestDiscoveryFeed {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let name = url
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or("rest")
            .to_string();

        Ok(Self {
            name,
            url,
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl DiscoveryFeed for RestDiscoveryFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<DiscoveredToken>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("discovery request to {} failed", self.name))?;

        if !response.status().is_success() {
            anyhow::bail!("discovery feed {} returned {}", self.name, response.status());
        }

        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("discovery feed {} sent invalid JSON", self.name))?;

        let tokens = parse_tokens(&payload, &self.name);
        debug!("🔍 {} listed {} tokens", self.name, tokens.len());
        Ok(tokens)
    }
}
