// Cumulative trade statistics, persisted as JSON after every outcome

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{OutcomeKind, TradeOutcome, LAMPORTS_PER_SOL};

/// Stats file contents. Profit fields are in SOL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_trades: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub simulation_skipped: u64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub net_profit: f64,
    pub start_time: DateTime<Utc>,

    // Process-local counters, not persisted
    #[serde(skip)]
    pub opportunities_detected: u64,
    #[serde(skip)]
    pub cycles: u64,
}

impl StatsSnapshot {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            total_trades: 0,
            successful_trades: 0,
            failed_trades: 0,
            simulation_skipped: 0,
            total_profit: 0.0,
            total_loss: 0.0,
            net_profit: 0.0,
            start_time,
            opportunities_detected: 0,
            cycles: 0,
        }
    }

    pub fn apply(&mut self, outcome: &TradeOutcome) {
        match outcome.kind {
            OutcomeKind::Skipped => {
                self.simulation_skipped += 1;
                return;
            }
            OutcomeKind::Success => self.successful_trades += 1,
            OutcomeKind::Failed | OutcomeKind::Stranded => self.failed_trades += 1,
        }
        self.total_trades += 1;

        let sol = outcome.realized_profit_lamports as f64 / LAMPORTS_PER_SOL;
        if sol >= 0.0 {
            self.total_profit += sol;
        } else {
            self.total_loss += -sol;
        }
        self.net_profit = self.total_profit - self.total_loss;
    }
}

/// Owner of the stats file
pub struct StatsStore {
    path: PathBuf,
    inner: Mutex<StatsSnapshot>,
}

impl StatsStore {
    /// Resume from an existing file, or start fresh
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<StatsSnapshot>(&raw) {
                Ok(existing) => {
                    info!(
                        "📈 Resuming stats from {}: {} trades, net {:.6} SOL",
                        path.display(),
                        existing.total_trades,
                        existing.net_profit
                    );
                    existing
                }
                Err(e) => {
                    warn!("⚠️ Stats file {} unreadable ({}), starting fresh", path.display(), e);
                    StatsSnapshot::new(Utc::now())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatsSnapshot::new(Utc::now()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        Ok(Self {
            path,
            inner: Mutex::new(snapshot),
        })
    }

    /// Apply one outcome and rewrite the file
    pub async fn record(&self, outcome: &TradeOutcome) -> Result<()> {
        let snapshot = {
            let mut inner = self.inner.lock().await;
            inner.apply(outcome);
            inner.clone()
        };
        write_json_atomic(&self.path, &snapshot).await?;
        debug!("📈 Stats updated: {:?} → {} trades", outcome.kind, snapshot.total_trades);
        Ok(())
    }

    pub async fn record_opportunity(&self) {
        self.inner.lock().await.opportunities_detected += 1;
    }

    pub async fn record_cycle(&self) {
        self.inner.lock().await.cycles += 1;
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().await.clone()
    }

    /// Final write, used at shutdown
    pub async fn flush(&self) -> Result<()> {
        let snapshot = self.snapshot().await;
        write_json_atomic(&self.path, &snapshot).await
    }
}

/// Temp file + rename so readers never see a half-written file
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_classifies_outcomes() {
        let mut s = StatsSnapshot::new(Utc::now());
        s.apply(&TradeOutcome::succeeded(2_000_000, "a".into(), "b".into()));
        s.apply(&TradeOutcome::failed(500_000, None));
        s.apply(&TradeOutcome::stranded(500_000, "c".into()));
        s.apply(&TradeOutcome::skipped());

        assert_eq!(s.total_trades, 3);
        assert_eq!(s.successful_trades, 1);
        assert_eq!(s.failed_trades, 2);
        assert_eq!(s.simulation_skipped, 1);
        assert!((s.total_profit - 0.002).abs() < 1e-12);
        assert!((s.total_loss - 0.001).abs() < 1e-12);
        assert!((s.net_profit - 0.001).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_record_rewrites_file_with_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let store = StatsStore::open(&path).await.unwrap();

        store
            .record(&TradeOutcome::succeeded(1_000_000, "a".into(), "b".into()))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for key in [
            "totalTrades",
            "successfulTrades",
            "failedTrades",
            "simulationSkipped",
            "totalProfit",
            "totalLoss",
            "netProfit",
            "startTime",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["totalTrades"], 1);
        assert!(!path.with_extension("json.tmp").exists());

        // Reopening resumes the cumulative counters
        let reopened = StatsStore::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await.successful_trades, 1);
    }
}
