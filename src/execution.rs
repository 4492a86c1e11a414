// Two-leg trade sequencing
//
// BUILD → SIMULATE → SUBMIT_BUY → settle delay → SUBMIT_SELL → RECORD
//
// Only one round trip is ever in flight. A failed sell after a confirmed buy
// is a stranded position: one urgent alert, recorded as failed, never retried.

use async_trait::async_trait;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{ArbError, ArbResult};
use crate::notifier::{stranded_message, AlertLevel, Notifier};
use crate::submitter::Submitter;
use crate::tx_builder::{PendingTransaction, TransactionBuilder};
use crate::types::{ArbitrageOpportunity, Quote, TradeOutcome};

/// The three leg operations the state machine drives
#[async_trait]
pub trait LegExecutor: Send + Sync {
    async fn build(&self, quote: &Quote) -> ArbResult<PendingTransaction>;
    async fn simulate(&self, leg: &PendingTransaction) -> ArbResult<()>;
    async fn submit(&self, leg: &PendingTransaction) -> ArbResult<Signature>;
}

/// Live executor: aggregator build + relay submission
pub struct ChainLegExecutor {
    builder: TransactionBuilder,
    submitter: Submitter,
}

impl ChainLegExecutor {
    pub fn new(builder: TransactionBuilder, submitter: Submitter) -> Self {
        Self { builder, submitter }
    }
}

#[async_trait]
impl LegExecutor for ChainLegExecutor {
    async fn build(&self, quote: &Quote) -> ArbResult<PendingTransaction> {
        self.builder.build(quote).await
    }

    async fn simulate(&self, leg: &PendingTransaction) -> ArbResult<()> {
        self.submitter.simulate(leg).await
    }

    async fn submit(&self, leg: &PendingTransaction) -> ArbResult<Signature> {
        self.submitter.submit(leg).await
    }
}

/// Run one opportunity through both legs
pub async fn execute_round_trip(
    executor: &dyn LegExecutor,
    notifier: &Arc<dyn Notifier>,
    opp: &ArbitrageOpportunity,
    settle_delay: Duration,
) -> TradeOutcome {
    let leg_cost = opp.total_fees_lamports / 2;

    info!("⚡ Executing {}", opp.description());

    // BUILD
    let buy_leg = match executor.build(&opp.buy_quote).await {
        Ok(leg) => leg,
        Err(e) => {
            warn!("⏭️ Buy build failed, skipping: {}", e);
            return TradeOutcome::skipped();
        }
    };

    // SIMULATE
    if let Err(e) = executor.simulate(&buy_leg).await {
        warn!("⏭️ Buy leg did not simulate, skipping: {}", e);
        return TradeOutcome::skipped();
    }

    // SUBMIT_BUY
    let buy_signature = match executor.submit(&buy_leg).await {
        Ok(sig) => sig,
        Err(e) => {
            warn!("❌ Buy leg failed: {}", e);
            return TradeOutcome::failed(leg_cost, signature_of(&e));
        }
    };
    info!("✅ Buy leg confirmed: {}", buy_signature);

    tokio::time::sleep(settle_delay).await;

    // SUBMIT_SELL
    let sell_result = match executor.build(&opp.sell_quote).await {
        Ok(sell_leg) => executor.submit(&sell_leg).await,
        Err(e) => Err(e),
    };

    match sell_result {
        Ok(sell_signature) => {
            info!(
                "💰 Round trip complete: buy {} sell {} (est. net {:.6} SOL)",
                buy_signature,
                sell_signature,
                opp.net_profit_sol()
            );
            TradeOutcome::succeeded(
                opp.estimated_net_profit_lamports,
                buy_signature.to_string(),
                sell_signature.to_string(),
            )
        }
        Err(e) => {
            let stranded = ArbError::StrandedPosition {
                asset: opp.token_asset_id.clone(),
                buy_signature: buy_signature.to_string(),
                reason: e.to_string(),
            };
            error!("🚨 {}", stranded);

            notifier
                .notify(
                    AlertLevel::Urgent,
                    &stranded_message(opp, &buy_signature.to_string(), &e.to_string()),
                )
                .await;

            TradeOutcome::stranded(leg_cost, buy_signature.to_string())
        }
    }
}

/// Signature named by a post-send leg error, if any
fn signature_of(err: &ArbError) -> Option<String> {
    match err {
        ArbError::ConfirmationTimeout { signature }
        | ArbError::BlockhashExpired { signature }
        | ArbError::TransactionFailed { signature, .. } => Some(signature.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_of_post_send_errors() {
        let timeout = ArbError::ConfirmationTimeout {
            signature: "abc".into(),
        };
        assert_eq!(signature_of(&timeout), Some("abc".to_string()));
        assert_eq!(signature_of(&ArbError::submission_failed("x")), None);
    }
}
