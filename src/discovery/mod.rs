// Token discovery: feed sources and the single ingestion path they share
//
// Polled REST feeds and the push feed both hand batches of `DiscoveredToken`
// to `DiscoveryIngest::ingest`, which applies the volume/liquidity filters,
// keeps the fresh discovered set for candidate building, and appends tokens
// never seen before to the watchlist.

pub mod push_feed;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::types::WatchlistEntry;
use crate::watchlist::{SeenSet, Watchlist};

pub use push_feed::{Backoff, FeedState, PushFeed};
pub use rest::RestDiscoveryFeed;

/// Discovered tokens older than this drop out of the candidate set
pub const DISCOVERY_TTL: Duration = Duration::from_secs(600);

/// Token reported by a discovery source. Missing metrics count as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredToken {
    pub asset_id: String,
    pub symbol: String,
    pub volume_24h_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub source: String,
}

/// Polled discovery source
#[async_trait]
pub trait DiscoveryFeed: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<DiscoveredToken>>;
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryFilter {
    pub min_volume_24h_usd: f64,
    pub min_liquidity_usd: f64,
}

impl DiscoveryFilter {
    pub fn passes(&self, token: &DiscoveredToken) -> bool {
        token.volume_24h_usd.unwrap_or(0.0) >= self.min_volume_24h_usd
            && token.liquidity_usd.unwrap_or(0.0) >= self.min_liquidity_usd
    }
}

/// Pull a token out of one JSON object, tolerating the common field spellings
pub fn parse_token(value: &Value, source: &str) -> Option<DiscoveredToken> {
    let asset_id = ["assetId", "id", "address", "mint", "tokenAddress"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))?
        .to_string();
    if asset_id.is_empty() {
        return None;
    }

    let symbol = value
        .get("symbol")
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string();

    let volume_24h_usd = ["volume24h", "volume24hUsd", "daily_volume", "volume_24h"]
        .iter()
        .find_map(|k| number(value.get(*k)))
        .or_else(|| {
            let stats = value.get("stats24h")?;
            let buy = number(stats.get("buyVolume")).unwrap_or(0.0);
            let sell = number(stats.get("sellVolume")).unwrap_or(0.0);
            Some(buy + sell)
        });

    let liquidity_usd = ["liquidity", "liquidityUsd", "liquidity_usd"]
        .iter()
        .find_map(|k| number(value.get(*k)));

    Some(DiscoveredToken {
        asset_id,
        symbol,
        volume_24h_usd,
        liquidity_usd,
        source: source.to_string(),
    })
}

/// Tokens in a feed payload: a bare array, `{data: [...]}`, `{tokens: [...]}` or one object
pub fn parse_tokens(payload: &Value, source: &str) -> Vec<DiscoveredToken> {
    let items = payload
        .as_array()
        .or_else(|| payload.get("data").and_then(Value::as_array))
        .or_else(|| payload.get("tokens").and_then(Value::as_array));

    match items {
        Some(items) => items.iter().filter_map(|v| parse_token(v, source)).collect(),
        None => {
            let inner = payload.get("data").filter(|d| d.is_object()).unwrap_or(payload);
            parse_token(inner, source).into_iter().collect()
        }
    }
}

// Numbers sometimes arrive as strings
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

struct FreshToken {
    token: DiscoveredToken,
    seen_at: Instant,
}

/// Shared sink for every discovery source
pub struct DiscoveryIngest {
    filter: DiscoveryFilter,
    seen: Arc<SeenSet>,
    watchlist: Watchlist,
    discovered: DashMap<String, FreshToken>,
    ttl: Duration,
}

impl DiscoveryIngest {
    pub fn new(filter: DiscoveryFilter, seen: Arc<SeenSet>, watchlist: Watchlist) -> Self {
        Self {
            filter,
            seen,
            watchlist,
            discovered: DashMap::new(),
            ttl: DISCOVERY_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Filter a batch, refresh the discovered set and append new tokens to
    /// the watchlist. Returns how many tokens passed the filters.
    pub async fn ingest(&self, tokens: Vec<DiscoveredToken>) -> usize {
        let mut accepted = 0;
        let mut seen_changed = false;

        for token in tokens {
            if !self.filter.passes(&token) {
                debug!(
                    "🔍 Dropped {} ({}): volume {:?} liquidity {:?}",
                    token.symbol, token.asset_id, token.volume_24h_usd, token.liquidity_usd
                );
                continue;
            }
            accepted += 1;

            if self.seen.insert(&token.asset_id) {
                seen_changed = true;
                let entry = WatchlistEntry {
                    asset_id: token.asset_id.clone(),
                    symbol: token.symbol.clone(),
                    source: token.source.clone(),
                    discovered_at: Utc::now(),
                };
                match self.watchlist.push(entry).await {
                    Ok(true) => info!("🆕 Discovered {} via {}", token.symbol, token.source),
                    Ok(false) => {}
                    Err(e) => warn!("⚠️ Watchlist append failed for {}: {}", token.asset_id, e),
                }
            }

            self.discovered.insert(
                token.asset_id.clone(),
                FreshToken {
                    token,
                    seen_at: Instant::now(),
                },
            );
        }

        if seen_changed {
            if let Err(e) = self.seen.save().await {
                warn!("⚠️ Failed to persist seen-set: {}", e);
            }
        }

        accepted
    }

    /// Discovered tokens still within the freshness window
    pub fn discovered(&self) -> Vec<DiscoveredToken> {
        self.discovered.retain(|_, fresh| fresh.seen_at.elapsed() < self.ttl);
        self.discovered
            .iter()
            .map(|entry| entry.value().token.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(id: &str, volume: Option<f64>, liquidity: Option<f64>) -> DiscoveredToken {
        DiscoveredToken {
            asset_id: id.to_string(),
            symbol: id.to_uppercase(),
            volume_24h_usd: volume,
            liquidity_usd: liquidity,
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_filter_requires_both_metrics() {
        let filter = DiscoveryFilter {
            min_volume_24h_usd: 100_000.0,
            min_liquidity_usd: 50_000.0,
        };
        assert!(filter.passes(&token("a", Some(100_000.0), Some(50_000.0))));
        assert!(!filter.passes(&token("b", Some(1e9), Some(49_999.0))));
        assert!(!filter.passes(&token("c", Some(99_999.0), Some(1e9))));
        assert!(!filter.passes(&token("d", None, Some(1e9))));
    }

    #[test]
    fn test_parse_trending_payload() {
        let payload = json!([
            {"id": "MintA", "symbol": "AAA", "liquidity": 120000.5,
             "stats24h": {"buyVolume": 60000.0, "sellVolume": 70000.0}},
            {"address": "MintB", "symbol": "BBB", "volume24h": "250000", "liquidityUsd": "90000"},
            {"symbol": "no-id"}
        ]);
        let tokens = parse_tokens(&payload, "rest");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].asset_id, "MintA");
        assert_eq!(tokens[0].volume_24h_usd, Some(130_000.0));
        assert_eq!(tokens[1].liquidity_usd, Some(90_000.0));
        assert_eq!(tokens[1].source, "rest");
    }

    #[test]
    fn test_parse_single_event_payload() {
        let payload = json!({"type": "newToken", "data": {"mint": "MintC", "symbol": "CCC"}});
        let tokens = parse_tokens(&payload, "push");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].asset_id, "MintC");
        assert_eq!(tokens[0].volume_24h_usd, None);
    }

    #[tokio::test]
    async fn test_ingest_appends_new_tokens_once() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(SeenSet::load(dir.path().join("seen.json")).await.unwrap());
        let watchlist = Watchlist::new(dir.path().join("watchlist.json"), 10);
        let ingest = DiscoveryIngest::new(
            DiscoveryFilter {
                min_volume_24h_usd: 10.0,
                min_liquidity_usd: 10.0,
            },
            seen.clone(),
            watchlist.clone(),
        );

        let batch = vec![token("a", Some(100.0), Some(100.0)), token("b", Some(1.0), Some(100.0))];
        assert_eq!(ingest.ingest(batch.clone()).await, 1);
        assert_eq!(ingest.ingest(batch).await, 1);

        let entries = watchlist.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].asset_id, "a");
        assert!(seen.contains("a"));
        assert!(!seen.contains("b"));
        let discovered = ingest.discovered();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].volume_24h_usd, Some(100.0));

        // Persisted for the next process
        assert!(SeenSet::load(dir.path().join("seen.json")).await.unwrap().contains("a"));
    }

    #[tokio::test]
    async fn test_stale_discoveries_expire() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(SeenSet::load(dir.path().join("seen.json")).await.unwrap());
        let ingest = DiscoveryIngest::new(
            DiscoveryFilter {
                min_volume_24h_usd: 0.0,
                min_liquidity_usd: 0.0,
            },
            seen,
            Watchlist::new(dir.path().join("watchlist.json"), 5),
        )
        .with_ttl(Duration::ZERO);

        ingest.ingest(vec![token("a", None, None)]).await;
        assert!(ingest.discovered().is_empty());
    }
}
