// Cost model for round-trip arbitrage
//
// A round trip is two transactions (buy leg + sell leg). Each leg pays:
// - a priority tip to the relay (sized from the tip floor)
// - the base signature fee
// - an estimated priority fee (aggregator sets compute price "auto")
//
// Tip cost is time-varying, so the model is rebuilt for every evaluation.

use tracing::debug;

/// Transactions per round trip
pub const LEGS_PER_ROUND_TRIP: u64 = 2;

/// Per-leg cost inputs for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeModel {
    /// Relay tip per transaction
    pub tip_lamports: u64,

    /// Base transaction fee (5000 lamports typical)
    pub base_fee_lamports: u64,

    /// Priority fee estimate per transaction
    pub priority_fee_lamports: u64,
}

impl FeeModel {
    pub fn new(tip_lamports: u64, base_fee_lamports: u64, priority_fee_lamports: u64) -> Self {
        Self {
            tip_lamports,
            base_fee_lamports,
            priority_fee_lamports,
        }
    }

    /// Zero-cost model (idealised round trips)
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Cost of a single leg, `None` on overflow
    pub fn per_leg_lamports(&self) -> Option<u64> {
        self.tip_lamports
            .checked_add(self.base_fee_lamports)?
            .checked_add(self.priority_fee_lamports)
    }

    /// 2×tip + 2×base fee + 2×priority fee, `None` on overflow
    pub fn total_lamports(&self) -> Option<u64> {
        let total = self.per_leg_lamports()?.checked_mul(LEGS_PER_ROUND_TRIP)?;

        debug!(
            "📊 Fee model: tip {} + base {} + priority {} per leg → {:.6} SOL total",
            self.tip_lamports,
            self.base_fee_lamports,
            self.priority_fee_lamports,
            total as f64 / 1e9
        );

        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_two_of_each() {
        let model = FeeModel::new(200_000, 5_000, 100_000);
        assert_eq!(model.per_leg_lamports(), Some(305_000));
        assert_eq!(model.total_lamports(), Some(610_000));
    }

    #[test]
    fn test_zero_model() {
        assert_eq!(FeeModel::zero().total_lamports(), Some(0));
    }

    #[test]
    fn test_overflow_has_no_total() {
        assert_eq!(FeeModel::new(u64::MAX, 1, 1).total_lamports(), None);
        // Per leg fits, doubling does not
        assert_eq!(FeeModel::new(u64::MAX / 2 + 1, 0, 0).total_lamports(), None);
    }
}
