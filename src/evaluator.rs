// Round-trip opportunity evaluation
//
// For each base currency, in order:
//   base → token with the configured trade size
//   token → base with exactly the buy leg's output
// then subtract the full two-leg fee model. The best accepted base wins.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::cost_calculator::FeeModel;
use crate::error::{ArbError, ArbResult};
use crate::jito_tip_monitor::TipOracle;
use crate::jupiter::QuoteSource;
use crate::types::{ArbitrageOpportunity, BaseCurrency, Quote, TokenCandidate};

/// Profit figures for one priced round trip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTripEvaluation {
    pub gross_profit_lamports: i64,
    pub total_fees_lamports: u64,
    pub net_profit_lamports: i64,
    pub profit_percent: f64,
}

impl RoundTripEvaluation {
    /// Net profit strictly positive and at least the minimum percent
    pub fn is_acceptable(&self, min_profit_percent: f64) -> bool {
        self.net_profit_lamports > 0 && self.profit_percent >= min_profit_percent
    }
}

/// Reject quotes whose impact reaches the limit.
///
/// The boundary is inclusive: impact equal to `max_pct` is rejected.
pub fn check_price_impact(quote: &Quote, max_pct: f64) -> ArbResult<()> {
    if quote.price_impact_pct >= max_pct {
        return Err(ArbError::PriceImpactExceeded {
            impact_pct: quote.price_impact_pct,
            max_pct,
        });
    }
    Ok(())
}

/// Net profit = (final − initial) − (2×tip + 2×base fee + 2×priority fee), in lamports.
///
/// Amounts or fees that do not fit the signed lamport range reject the trip.
pub fn evaluate_round_trip(
    base: &BaseCurrency,
    buy: &Quote,
    sell: &Quote,
    fees: &FeeModel,
) -> ArbResult<RoundTripEvaluation> {
    let out_of_range = || ArbError::quote_unavailable("round trip amounts out of range");

    let gross_atomic = i64::try_from(sell.out_amount as i128 - buy.in_amount as i128)
        .map_err(|_| out_of_range())?;
    let initial_atomic = i64::try_from(buy.in_amount).map_err(|_| out_of_range())?;
    let gross_profit_lamports = base.atomic_to_lamports(gross_atomic);
    let initial_lamports = base.atomic_to_lamports(initial_atomic);

    let total_fees_lamports = fees.total_lamports().ok_or_else(out_of_range)?;
    let fees_signed = i64::try_from(total_fees_lamports).map_err(|_| out_of_range())?;
    let net_profit_lamports = gross_profit_lamports
        .checked_sub(fees_signed)
        .ok_or_else(out_of_range)?;

    let profit_percent = if initial_lamports > 0 {
        net_profit_lamports as f64 / initial_lamports as f64 * 100.0
    } else {
        0.0
    };

    Ok(RoundTripEvaluation {
        gross_profit_lamports,
        total_fees_lamports,
        net_profit_lamports,
        profit_percent,
    })
}

/// Quotes round trips and applies the fee model
pub struct OpportunityEvaluator {
    quotes: Arc<dyn QuoteSource>,
    tips: Arc<dyn TipOracle>,
    bases: Vec<BaseCurrency>,
    trade_size_sol: f64,
    max_price_impact_pct: f64,
    min_profit_percent: f64,
    base_fee_lamports: u64,
    priority_fee_lamports: u64,
}

impl OpportunityEvaluator {
    pub fn new(config: &Config, quotes: Arc<dyn QuoteSource>, tips: Arc<dyn TipOracle>) -> Self {
        Self {
            quotes,
            tips,
            bases: config.base_currencies.clone(),
            trade_size_sol: config.trade_size_sol,
            max_price_impact_pct: config.max_price_impact_pct,
            min_profit_percent: config.min_profit_percent,
            base_fee_lamports: config.base_fee_lamports,
            priority_fee_lamports: config.priority_fee_estimate_lamports,
        }
    }

    pub fn bases(&self) -> &[BaseCurrency] {
        &self.bases
    }

    /// Best profitable round trip across all bases, if any
    pub async fn find_opportunity(&self, candidate: &TokenCandidate) -> Option<ArbitrageOpportunity> {
        let mut best: Option<ArbitrageOpportunity> = None;

        for base in &self.bases {
            if base.mint == candidate.asset_id {
                continue;
            }

            match self.evaluate_base(candidate, base).await {
                Ok(Some(opp)) => {
                    let better = best
                        .as_ref()
                        .map(|b| opp.estimated_net_profit_lamports > b.estimated_net_profit_lamports)
                        .unwrap_or(true);
                    if better {
                        best = Some(opp);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("   {} via {}: {}", candidate.symbol, base.symbol, e);
                }
            }
        }

        if let Some(ref opp) = best {
            info!(
                "🎯 Opportunity: {} | gross {} | fees {} | net {:.6} SOL ({:.3}%)",
                opp.description(),
                opp.gross_profit_lamports,
                opp.total_fees_lamports,
                opp.net_profit_sol(),
                opp.profit_percent
            );
        }

        best
    }

    /// Price one base. `Ok(None)` = priced but not profitable.
    pub async fn evaluate_base(
        &self,
        candidate: &TokenCandidate,
        base: &BaseCurrency,
    ) -> ArbResult<Option<ArbitrageOpportunity>> {
        let amount = base.trade_amount_atomic(self.trade_size_sol);
        if amount == 0 {
            return Err(ArbError::quote_unavailable("trade size rounds to zero"));
        }

        let buy = self.quotes.quote(&base.mint, &candidate.asset_id, amount).await?;
        check_price_impact(&buy, self.max_price_impact_pct)?;
        if buy.out_amount == 0 {
            return Err(ArbError::quote_unavailable("buy quote returned zero output"));
        }

        // Sell exactly what the buy leg yields
        let sell = self
            .quotes
            .quote(&candidate.asset_id, &base.mint, buy.out_amount)
            .await?;
        check_price_impact(&sell, self.max_price_impact_pct)?;

        let tip = self.tips.tip_lamports().await;
        let fees = FeeModel::new(tip, self.base_fee_lamports, self.priority_fee_lamports);
        let eval = evaluate_round_trip(base, &buy, &sell, &fees)?;

        debug!(
            "🔺 {}→{}→{}: gross {} fees {} net {} ({:.4}%)",
            base.symbol,
            candidate.symbol,
            base.symbol,
            eval.gross_profit_lamports,
            eval.total_fees_lamports,
            eval.net_profit_lamports,
            eval.profit_percent
        );

        if !eval.is_acceptable(self.min_profit_percent) {
            return Ok(None);
        }

        Ok(Some(ArbitrageOpportunity {
            token_asset_id: candidate.asset_id.clone(),
            token_symbol: candidate.symbol.clone(),
            base: base.clone(),
            route_label: format!("{} | {}", buy.route_label, sell.route_label),
            buy_quote: buy,
            sell_quote: sell,
            gross_profit_lamports: eval.gross_profit_lamports,
            total_fees_lamports: eval.total_fees_lamports,
            estimated_net_profit_lamports: eval.net_profit_lamports,
            profit_percent: eval.profit_percent,
        }))
    }
}
