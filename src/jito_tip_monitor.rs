// Jito tip floor feed with a bounded-lifetime cache
//
// The tip floor endpoint publishes landed-tip percentiles in SOL. We size every
// relay tip from the 75th percentile, floored at the protocol minimum, and only
// refetch once the cached value is older than the configured TTL.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Smallest tip the relay accepts
pub const MIN_TIP_LAMPORTS: u64 = 1_000;

/// Hard cap (0.003 SOL) so a tip-floor spike cannot dominate the fee model
pub const MAX_TIP_LAMPORTS: u64 = 3_000_000;

/// Keep a tip within the protocol minimum and the hard cap
pub fn clamp_tip(lamports: u64) -> u64 {
    let clamped = lamports.clamp(MIN_TIP_LAMPORTS, MAX_TIP_LAMPORTS);
    if clamped < lamports {
        debug!(
            "🔒 Tip CAPPED: {:.6} SOL → {:.6} SOL (market spike protection)",
            lamports as f64 / 1e9,
            clamped as f64 / 1e9
        );
    }
    clamped
}

/// Jito tip floor percentile data
#[derive(Debug, Clone, Deserialize)]
pub struct JitoTipFloor {
    #[serde(rename = "landed_tips_25th_percentile")]
    pub p25: f64,

    #[serde(rename = "landed_tips_50th_percentile")]
    pub p50: f64,

    #[serde(rename = "landed_tips_75th_percentile")]
    pub p75: f64,

    #[serde(rename = "landed_tips_95th_percentile")]
    pub p95: f64,

    #[serde(rename = "landed_tips_99th_percentile")]
    pub p99: f64,

    #[serde(rename = "ema_landed_tips_50th_percentile")]
    pub ema_p50: f64,
}

impl Default for JitoTipFloor {
    fn default() -> Self {
        Self {
            // Conservative defaults (if API fails, use higher tips)
            p25: 0.000001,
            p50: 0.000001,
            p75: 0.000010,
            p95: 0.001000,
            p99: 0.010000,
            ema_p50: 0.000001,
        }
    }
}

impl JitoTipFloor {
    /// Tip to attach: 75th percentile in lamports, within [`MIN_TIP_LAMPORTS`, `MAX_TIP_LAMPORTS`]
    pub fn tip_lamports(&self) -> u64 {
        let lamports = if self.p75.is_finite() && self.p75 > 0.0 {
            (self.p75 * 1_000_000_000.0).round() as u64
        } else {
            0
        };
        clamp_tip(lamports)
    }
}

/// Provides the current per-transaction tip
#[async_trait]
pub trait TipOracle: Send + Sync {
    async fn tip_lamports(&self) -> u64;
}

/// Fixed tip (paper trading, tests)
pub struct FixedTip(pub u64);

#[async_trait]
impl TipOracle for FixedTip {
    async fn tip_lamports(&self) -> u64 {
        clamp_tip(self.0)
    }
}

struct CachedTip {
    lamports: u64,
    fetched_at: Instant,
}

/// Tip floor client with TTL cache
pub struct TipFloorCache {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    cached: RwLock<Option<CachedTip>>,
}

impl TipFloorCache {
    pub fn new(url: String, ttl: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url,
            ttl,
            cached: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> Result<JitoTipFloor> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Jito tip floor API returned {}", response.status());
        }

        let data: Vec<JitoTipFloor> = response.json().await?;

        // Most recent entry first
        data.into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty response from Jito tip floor API"))
    }

    /// Cached value if still fresh
    async fn fresh_cached(&self) -> Option<u64> {
        let cache = self.cached.read().await;
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.lamports)
    }

    /// Store a value (used at refresh and by tests)
    pub async fn store(&self, lamports: u64) {
        *self.cached.write().await = Some(CachedTip {
            lamports: clamp_tip(lamports),
            fetched_at: Instant::now(),
        });
    }
}

#[async_trait]
impl TipOracle for TipFloorCache {
    async fn tip_lamports(&self) -> u64 {
        if let Some(lamports) = self.fresh_cached().await {
            debug!("⚡ Using cached tip floor: {} lamports", lamports);
            return lamports;
        }

        match self.fetch().await {
            Ok(floor) => {
                let lamports = floor.tip_lamports();
                info!(
                    "📊 Tip floor refreshed: p75 {:.9} SOL → tip {} lamports",
                    floor.p75, lamports
                );
                self.store(lamports).await;
                lamports
            }
            Err(e) => {
                // Stale value beats the conservative default
                let stale = self.cached.read().await.as_ref().map(|c| c.lamports);
                match stale {
                    Some(lamports) => {
                        warn!("⚠️ Tip floor fetch failed ({}), reusing stale {} lamports", e, lamports);
                        lamports
                    }
                    None => {
                        let lamports = JitoTipFloor::default().tip_lamports();
                        warn!("⚠️ Tip floor fetch failed ({}), using default {} lamports", e, lamports);
                        lamports
                    }
                }
            }
        }
    }
}
