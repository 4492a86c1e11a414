// Per-cycle candidate list
//
// Order: seeds and discovered tokens by 24h volume (descending), then the
// watchlist in file order. Watchlist entries bypass the discovery filters and
// are never cut by the cap; the volume-sorted part is truncated to make room.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::discovery::{DiscoveredToken, DiscoveryFeed, DiscoveryIngest};
use crate::types::{CandidateOrigin, TokenCandidate, WatchlistEntry};
use crate::watchlist::Watchlist;

/// Liquid tokens that are always evaluated
pub const SEED_TOKENS: &[(&str, &str)] = &[
    ("JUP", "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN"),
    ("BONK", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"),
    ("WIF", "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm"),
    ("PYTH", "HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3"),
    ("RAY", "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R"),
    ("ORCA", "orcaEKTdK7LKz57vaAYr9QeNsVEPfiu6QeMU1kektZE"),
    ("USDT", "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
    ("mSOL", "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So"),
    ("JitoSOL", "J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SeedToken {
    pub symbol: String,
    pub asset_id: String,
}

pub fn default_seeds() -> Vec<SeedToken> {
    SEED_TOKENS
        .iter()
        .map(|(symbol, mint)| SeedToken {
            symbol: symbol.to_string(),
            asset_id: mint.to_string(),
        })
        .collect()
}

/// Merge seeds, discoveries and the watchlist into at most `max` candidates
pub fn merge_candidates(
    seeds: &[SeedToken],
    discovered: &[DiscoveredToken],
    watchlist: &[WatchlistEntry],
    max: usize,
) -> Vec<TokenCandidate> {
    let mut taken: HashSet<String> = HashSet::new();

    let mut tail: Vec<TokenCandidate> = Vec::new();
    for entry in watchlist {
        if tail.len() >= max {
            break;
        }
        if taken.insert(entry.asset_id.clone()) {
            tail.push(TokenCandidate {
                asset_id: entry.asset_id.clone(),
                symbol: entry.symbol.clone(),
                volume_score: 0.0,
                origin: CandidateOrigin::Watchlist,
            });
        }
    }

    let volume_of = |asset_id: &str| {
        discovered
            .iter()
            .find(|d| d.asset_id == asset_id)
            .and_then(|d| d.volume_24h_usd)
            .unwrap_or(0.0)
    };

    let mut head: Vec<TokenCandidate> = Vec::new();
    for seed in seeds {
        if taken.insert(seed.asset_id.clone()) {
            head.push(TokenCandidate {
                asset_id: seed.asset_id.clone(),
                symbol: seed.symbol.clone(),
                volume_score: volume_of(&seed.asset_id),
                origin: CandidateOrigin::Seed,
            });
        }
    }
    for token in discovered {
        if taken.insert(token.asset_id.clone()) {
            head.push(TokenCandidate {
                asset_id: token.asset_id.clone(),
                symbol: token.symbol.clone(),
                volume_score: token.volume_24h_usd.unwrap_or(0.0),
                origin: CandidateOrigin::Discovered,
            });
        }
    }

    // Stable: ties keep seed-then-discovery order
    head.sort_by(|a, b| b.volume_score.total_cmp(&a.volume_score));
    head.truncate(max.saturating_sub(tail.len()));

    head.extend(tail);
    head
}

pub struct CandidateSource {
    seeds: Vec<SeedToken>,
    feeds: Vec<Arc<dyn DiscoveryFeed>>,
    push_events: Option<Mutex<mpsc::UnboundedReceiver<DiscoveredToken>>>,
    ingest: Arc<DiscoveryIngest>,
    watchlist: Watchlist,
    max_candidates: usize,
    feed_timeout: Duration,
}

impl CandidateSource {
    pub fn new(
        seeds: Vec<SeedToken>,
        ingest: Arc<DiscoveryIngest>,
        watchlist: Watchlist,
        max_candidates: usize,
        feed_timeout: Duration,
    ) -> Self {
        Self {
            seeds,
            feeds: Vec::new(),
            push_events: None,
            ingest,
            watchlist,
            max_candidates,
            feed_timeout,
        }
    }

    pub fn with_feed(mut self, feed: Arc<dyn DiscoveryFeed>) -> Self {
        self.feeds.push(feed);
        self
    }

    pub fn with_push_events(mut self, events: mpsc::UnboundedReceiver<DiscoveredToken>) -> Self {
        self.push_events = Some(Mutex::new(events));
        self
    }

    /// Poll feeds, drain pushed events, re-read the watchlist and merge
    pub async fn get_candidates(&self) -> Vec<TokenCandidate> {
        if let Some(ref events) = self.push_events {
            let mut pushed = Vec::new();
            {
                let mut rx = events.lock().await;
                while let Ok(token) = rx.try_recv() {
                    pushed.push(token);
                }
            }
            if !pushed.is_empty() {
                debug!("📡 {} pushed token events", pushed.len());
                self.ingest.ingest(pushed).await;
            }
        }

        for feed in &self.feeds {
            match tokio::time::timeout(self.feed_timeout, feed.fetch()).await {
                Ok(Ok(tokens)) => {
                    let accepted = self.ingest.ingest(tokens).await;
                    debug!("🔍 {}: {} tokens passed filters", feed.name(), accepted);
                }
                Ok(Err(e)) => warn!("⚠️ Discovery source {} skipped: {:#}", feed.name(), e),
                Err(_) => warn!(
                    "⚠️ Discovery source {} timed out after {:?}, skipped",
                    feed.name(),
                    self.feed_timeout
                ),
            }
        }

        // Re-read every cycle so external edits apply without restart
        let watchlist = match self.watchlist.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ Watchlist unreadable, ignoring this cycle: {:#}", e);
                Vec::new()
            }
        };

        let candidates = merge_candidates(
            &self.seeds,
            &self.ingest.discovered(),
            &watchlist,
            self.max_candidates,
        );

        info!(
            "🎯 {} candidates ({} watchlist)",
            candidates.len(),
            candidates
                .iter()
                .filter(|c| c.origin == CandidateOrigin::Watchlist)
                .count()
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn seed(id: &str) -> SeedToken {
        SeedToken {
            symbol: id.to_uppercase(),
            asset_id: id.to_string(),
        }
    }

    fn found(id: &str, volume: f64) -> DiscoveredToken {
        DiscoveredToken {
            asset_id: id.to_string(),
            symbol: id.to_uppercase(),
            volume_24h_usd: Some(volume),
            liquidity_usd: Some(1e9),
            source: "test".to_string(),
        }
    }

    fn listed(id: &str) -> WatchlistEntry {
        WatchlistEntry {
            asset_id: id.to_string(),
            symbol: id.to_uppercase(),
            source: "manual".to_string(),
            discovered_at: Utc::now(),
        }
    }

    fn ids(c: &[TokenCandidate]) -> Vec<&str> {
        c.iter().map(|c| c.asset_id.as_str()).collect()
    }

    #[test]
    fn test_sorted_by_volume_then_watchlist() {
        let merged = merge_candidates(
            &[seed("s1"), seed("s2")],
            &[found("d1", 500.0), found("s2", 900.0)],
            &[listed("w1"), listed("w2")],
            10,
        );
        assert_eq!(ids(&merged), vec!["s2", "d1", "s1", "w1", "w2"]);
        assert_eq!(merged[0].origin, CandidateOrigin::Seed);
        assert_eq!(merged[0].volume_score, 900.0);
        assert_eq!(merged[3].origin, CandidateOrigin::Watchlist);
    }

    #[test]
    fn test_deduplicated_by_asset_id() {
        let merged = merge_candidates(
            &[seed("a"), seed("a")],
            &[found("a", 1.0), found("b", 2.0)],
            &[listed("b"), listed("b")],
            10,
        );
        assert_eq!(ids(&merged), vec!["a", "b"]);
        assert_eq!(merged[1].origin, CandidateOrigin::Watchlist);
    }

    #[test]
    fn test_cap_keeps_watchlist() {
        let merged = merge_candidates(
            &[seed("s1"), seed("s2"), seed("s3")],
            &[found("s3", 10.0)],
            &[listed("w1")],
            2,
        );
        assert_eq!(ids(&merged), vec!["s3", "w1"]);
    }
}
