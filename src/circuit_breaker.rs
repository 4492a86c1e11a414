// Consecutive-failure circuit breaker
//
// CLOSED → OPEN once `max_failures` failed cycles arrive back to back.
// The engine sleeps the cooldown while OPEN, then calls `reset`.
// Any successful trade zeroes the counter regardless of state.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    tripped: AtomicBool,
    max_failures: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            tripped: AtomicBool::new(false),
            max_failures: max_failures.max(1),
            cooldown,
        }
    }

    /// Count a failed cycle. Returns true when this call opened the breaker.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!("⚠️ Consecutive failed cycles: {}/{}", failures, self.max_failures);

        if failures >= self.max_failures && !self.tripped.swap(true, Ordering::SeqCst) {
            warn!(
                "🔌 Circuit breaker OPEN after {} failures, cooling down {:?}",
                failures, self.cooldown
            );
            return true;
        }
        false
    }

    pub fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::SeqCst);
        if previous > 0 {
            info!("✅ Success after {} failed cycles, counter reset", previous);
        }
    }

    pub fn is_open(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Back to CLOSED with a zero counter (end of cooldown)
    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if self.tripped.swap(false, Ordering::SeqCst) {
            info!("🔌 Circuit breaker CLOSED, resuming");
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_exactly_max_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            assert!(!breaker.record_failure());
            assert!(!breaker.is_open());
        }
        assert!(breaker.record_failure());
        assert!(breaker.is_open());
        // Further failures while open do not re-trip
        assert!(!breaker.record_failure());
    }

    #[test]
    fn test_success_before_threshold_resets_counter() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_reset_after_cooldown_closes_fully() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        assert!(breaker.record_failure());
        breaker.reset();
        assert!(!breaker.is_open());
        assert_eq!(breaker.consecutive_failures(), 0);
    }
}
