use thiserror::Error;

/// Pipeline error taxonomy.
///
/// Every variant maps to one recovery policy in the engine:
/// - per-base / per-candidate errors (`QuoteUnavailable`, `PriceImpactExceeded`) are absorbed
/// - pre-trade errors (`BuildFailed`, `SimulationRejected`) abort with no funds moved
/// - leg errors (`SubmissionFailed`, `ConfirmationTimeout`, `BlockhashExpired`, `TransactionFailed`)
///   fail the leg
/// - `StrandedPosition` and `ConfigMissing` must reach a human
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArbError {
    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Price impact {impact_pct:.4}% exceeds limit {max_pct:.4}%")]
    PriceImpactExceeded { impact_pct: f64, max_pct: f64 },

    #[error("Transaction build failed: {0}")]
    BuildFailed(String),

    #[error("Simulation rejected: {0}")]
    SimulationRejected(String),

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Confirmation timeout for {signature} (status unknown)")]
    ConfirmationTimeout { signature: String },

    #[error("Blockhash expired before {signature} confirmed")]
    BlockhashExpired { signature: String },

    #[error("Transaction {signature} failed on-chain: {reason}")]
    TransactionFailed { signature: String, reason: String },

    #[error("STRANDED POSITION: holding {asset}, buy tx {buy_signature}, sell failed: {reason}")]
    StrandedPosition {
        asset: String,
        buy_signature: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    ConfigMissing(String),
}

impl ArbError {
    pub fn quote_unavailable(msg: impl Into<String>) -> Self {
        Self::QuoteUnavailable(msg.into())
    }

    pub fn build_failed(msg: impl Into<String>) -> Self {
        Self::BuildFailed(msg.into())
    }

    pub fn submission_failed(msg: impl Into<String>) -> Self {
        Self::SubmissionFailed(msg.into())
    }
}

pub type ArbResult<T> = std::result::Result<T, ArbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stranded_message_names_asset_and_buy() {
        let err = ArbError::StrandedPosition {
            asset: "MINT".into(),
            buy_signature: "BUYSIG".into(),
            reason: "relay error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("MINT"));
        assert!(msg.contains("BUYSIG"));
    }
}
