// Common types shared by the scanning and execution pipeline

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Currency a round trip starts and ends in.
///
/// All profit accounting happens in lamports. `units_per_sol` converts a
/// non-native base into SOL (static approximation for USDC).
#[derive(Debug, Clone, PartialEq)]
pub struct BaseCurrency {
    pub symbol: String,
    pub mint: String,
    pub decimals: u8,
    pub units_per_sol: f64,
}

impl BaseCurrency {
    pub fn sol() -> Self {
        Self {
            symbol: "SOL".to_string(),
            mint: SOL_MINT.to_string(),
            decimals: 9,
            units_per_sol: 1.0,
        }
    }

    pub fn usdc(usdc_per_sol: f64) -> Self {
        Self {
            symbol: "USDC".to_string(),
            mint: USDC_MINT.to_string(),
            decimals: 6,
            units_per_sol: usdc_per_sol,
        }
    }

    /// Parse "SOL" / "USDC" (case-insensitive)
    pub fn from_symbol(symbol: &str, usdc_per_sol: f64) -> Result<Self> {
        match symbol.trim().to_uppercase().as_str() {
            "SOL" | "WSOL" => Ok(Self::sol()),
            "USDC" => Ok(Self::usdc(usdc_per_sol)),
            other => Err(anyhow::anyhow!("Unsupported base currency: {}", other)),
        }
    }

    pub fn is_native(&self) -> bool {
        self.mint == SOL_MINT
    }

    fn atomic_per_unit(&self) -> f64 {
        10f64.powi(self.decimals as i32)
    }

    /// Trade size expressed in SOL → atomic units of this base
    pub fn trade_amount_atomic(&self, trade_size_sol: f64) -> u64 {
        (trade_size_sol * self.units_per_sol * self.atomic_per_unit()).round() as u64
    }

    /// Atomic amount of this base → lamports
    pub fn atomic_to_lamports(&self, atomic: i64) -> i64 {
        if self.is_native() {
            return atomic;
        }
        (atomic as f64 / self.atomic_per_unit() / self.units_per_sol * LAMPORTS_PER_SOL).round()
            as i64
    }
}

/// Where a candidate came from this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateOrigin {
    Seed,
    Discovered,
    Watchlist,
}

/// Asset considered for arbitrage in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct TokenCandidate {
    pub asset_id: String,
    pub symbol: String,
    pub volume_score: f64,
    pub origin: CandidateOrigin,
}

/// One aggregator quote. Never cached across cycles.
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub route_label: String,
    /// Untouched quote body, echoed back in the swap-build request
    pub raw: serde_json::Value,
}

/// Profitable round trip, consumed once by execution
#[derive(Debug, Clone)]
pub struct ArbitrageOpportunity {
    pub token_asset_id: String,
    pub token_symbol: String,
    pub base: BaseCurrency,
    pub route_label: String,
    pub buy_quote: Quote,
    pub sell_quote: Quote,
    pub gross_profit_lamports: i64,
    pub total_fees_lamports: u64,
    pub estimated_net_profit_lamports: i64,
    pub profit_percent: f64,
}

impl ArbitrageOpportunity {
    pub fn net_profit_sol(&self) -> f64 {
        self.estimated_net_profit_lamports as f64 / LAMPORTS_PER_SOL
    }

    pub fn description(&self) -> String {
        format!(
            "{}→{}→{} via {}",
            self.base.symbol, self.token_symbol, self.base.symbol, self.route_label
        )
    }
}

/// How a trade attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Both legs confirmed
    Success,
    /// Aborted in build or simulation, no funds moved
    Skipped,
    /// Buy leg failed, or any leg failed without leaving a position
    Failed,
    /// Buy confirmed, sell did not
    Stranded,
}

/// Recorded once per attempt, never mutated
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub kind: OutcomeKind,
    pub realized_profit_lamports: i64,
    pub buy_signature: Option<String>,
    pub sell_signature: Option<String>,
}

impl TradeOutcome {
    pub fn succeeded(profit_lamports: i64, buy: String, sell: String) -> Self {
        Self {
            kind: OutcomeKind::Success,
            realized_profit_lamports: profit_lamports,
            buy_signature: Some(buy),
            sell_signature: Some(sell),
        }
    }

    pub fn skipped() -> Self {
        Self {
            kind: OutcomeKind::Skipped,
            realized_profit_lamports: 0,
            buy_signature: None,
            sell_signature: None,
        }
    }

    pub fn failed(cost_lamports: u64, buy_signature: Option<String>) -> Self {
        Self {
            kind: OutcomeKind::Failed,
            realized_profit_lamports: -(cost_lamports as i64),
            buy_signature,
            sell_signature: None,
        }
    }

    pub fn stranded(cost_lamports: u64, buy_signature: String) -> Self {
        Self {
            kind: OutcomeKind::Stranded,
            realized_profit_lamports: -(cost_lamports as i64),
            buy_signature: Some(buy_signature),
            sell_signature: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    /// Counts toward the circuit breaker
    pub fn is_failure(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed | OutcomeKind::Stranded)
    }
}

/// Watchlist file record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub asset_id: String,
    pub symbol: String,
    pub source: String,
    pub discovered_at: DateTime<Utc>,
}
