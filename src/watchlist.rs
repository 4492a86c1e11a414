// Watchlist file and persisted seen-set
//
// The watchlist is re-read from disk every cycle so external edits take
// effect without a restart. It is capacity-bounded: appending at capacity
// evicts exactly the oldest entry (file order).

use anyhow::{Context, Result};
use dashmap::DashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::stats::write_json_atomic;
use crate::types::WatchlistEntry;

/// Append `entry`, dropping from the front while over capacity.
///
/// Returns the evicted entries. Duplicate asset ids are ignored.
pub fn push_bounded(
    entries: &mut Vec<WatchlistEntry>,
    entry: WatchlistEntry,
    capacity: usize,
) -> Vec<WatchlistEntry> {
    if capacity == 0 || entries.iter().any(|e| e.asset_id == entry.asset_id) {
        return Vec::new();
    }
    entries.push(entry);
    let overflow = entries.len().saturating_sub(capacity);
    entries.drain(..overflow).collect()
}

#[derive(Debug, Clone)]
pub struct Watchlist {
    path: PathBuf,
    capacity: usize,
}

impl Watchlist {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
        }
    }

    /// Current file contents; a missing file is an empty watchlist
    pub async fn load(&self) -> Result<Vec<WatchlistEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid watchlist file {}", self.path.display()))
    }

    pub async fn save(&self, entries: &[WatchlistEntry]) -> Result<()> {
        write_json_atomic(&self.path, &entries).await
    }

    /// Append one entry and persist. Returns false for a duplicate.
    pub async fn push(&self, entry: WatchlistEntry) -> Result<bool> {
        let mut entries = self.load().await?;
        if entries.iter().any(|e| e.asset_id == entry.asset_id) {
            return Ok(false);
        }

        let symbol = entry.symbol.clone();
        for evicted in push_bounded(&mut entries, entry, self.capacity) {
            debug!("📋 Watchlist full, evicted {} ({})", evicted.symbol, evicted.asset_id);
        }
        self.save(&entries).await?;
        info!("📋 Watchlist +{} ({}/{})", symbol, entries.len(), self.capacity);
        Ok(true)
    }
}

/// Asset ids already processed by discovery, persisted across restarts
#[derive(Debug)]
pub struct SeenSet {
    path: PathBuf,
    ids: DashSet<String>,
}

impl SeenSet {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ids = DashSet::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) => {
                    for id in list {
                        ids.insert(id);
                    }
                    debug!("👀 Loaded {} seen tokens from {}", ids.len(), path.display());
                }
                Err(e) => warn!("⚠️ Seen-set {} unreadable ({}), starting empty", path.display(), e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        }

        Ok(Self { path, ids })
    }

    /// True when the id was not seen before
    pub fn insert(&self, asset_id: &str) -> bool {
        self.ids.insert(asset_id.to_string())
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.ids.contains(asset_id)
    }

    pub async fn save(&self) -> Result<()> {
        let mut list: Vec<String> = self.ids.iter().map(|id| id.key().clone()).collect();
        list.sort();
        write_json_atomic(&self.path, &list).await
    }
}
