//! Request quota tracking.
//!
//! The remote service reports its remaining request allowance on every
//! response. The limiter keeps the last observed value and classifies it
//! against a low and a critical mark before each request. Below the critical
//! mark the caller must obtain an explicit confirmation to continue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::metrics;
use crate::remote::QuotaSnapshot;

use super::config::OrchestratorConfig;
use super::types::OrchestratorError;

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCheck {
    /// No response observed yet.
    Unknown,
    /// Comfortably above the low mark.
    Ok { remaining: u32 },
    /// Below the low mark.
    Low { remaining: u32 },
    /// Below the critical mark.
    Critical { remaining: u32 },
}

/// Decides whether to keep going once the quota is critical.
#[async_trait]
pub trait QuotaConfirmation: Send + Sync {
    /// Return `true` to continue issuing requests with `remaining` left.
    async fn confirm_continue(&self, remaining: u32) -> bool;
}

/// Always continues. For unattended runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysContinue;

#[async_trait]
impl QuotaConfirmation for AlwaysContinue {
    async fn confirm_continue(&self, _remaining: u32) -> bool {
        true
    }
}

/// Never continues past the critical mark.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverContinue;

#[async_trait]
impl QuotaConfirmation for NeverContinue {
    async fn confirm_continue(&self, _remaining: u32) -> bool {
        false
    }
}

/// Tracks the remaining request quota for one orchestration run.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    remaining: Option<u32>,
    reset_at: Option<DateTime<Utc>>,
    low_water: u32,
    critical_water: u32,
    /// Set once the caller agreed to continue below the critical mark.
    confirmed: bool,
}

impl RateLimiter {
    pub fn new(low_water: u32, critical_water: u32) -> Self {
        Self {
            remaining: None,
            reset_at: None,
            low_water,
            critical_water,
            confirmed: false,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.rate_limit_low_water, config.rate_limit_critical_water)
    }

    /// Record the quota seen on the latest response.
    ///
    /// Snapshots carrying no information leave the budget untouched.
    pub fn observe(&mut self, snapshot: QuotaSnapshot) {
        if let Some(remaining) = snapshot.remaining {
            self.remaining = Some(remaining);
            metrics::QUOTA_REMAINING.set(i64::from(remaining));
        }
        if snapshot.reset_at.is_some() {
            self.reset_at = snapshot.reset_at;
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// Classify the current budget, warning when it runs low.
    pub fn check_before_request(&self) -> QuotaCheck {
        let Some(remaining) = self.remaining else {
            return QuotaCheck::Unknown;
        };

        if remaining < self.critical_water {
            warn!(
                remaining,
                critical_water = self.critical_water,
                reset_at = ?self.reset_at,
                "Request quota critically low"
            );
            QuotaCheck::Critical { remaining }
        } else if remaining < self.low_water {
            warn!(
                remaining,
                low_water = self.low_water,
                "Request quota running low"
            );
            QuotaCheck::Low { remaining }
        } else {
            QuotaCheck::Ok { remaining }
        }
    }

    /// Gate the next request on the current budget.
    ///
    /// A critical budget asks `confirmation` once per run; after an approval
    /// later critical checks only warn. A decline fails with `QuotaExhausted`.
    pub async fn admit(
        &mut self,
        confirmation: &dyn QuotaConfirmation,
    ) -> Result<QuotaCheck, OrchestratorError> {
        let check = self.check_before_request();
        if let QuotaCheck::Critical { remaining } = check {
            if self.confirmed {
                return Ok(check);
            }
            if confirmation.confirm_continue(remaining).await {
                info!(remaining, "Continuing below critical request quota");
                self.confirmed = true;
            } else {
                warn!(remaining, "Continuation declined, stopping new requests");
                return Err(OrchestratorError::QuotaExhausted { remaining });
            }
        }
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts prompts and answers with a fixed value.
    struct CountingConfirmation {
        answer: bool,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl QuotaConfirmation for CountingConfirmation {
        async fn confirm_continue(&self, _remaining: u32) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[test]
    fn test_unknown_until_observed() {
        let limiter = RateLimiter::new(10, 5);
        assert_eq!(limiter.remaining(), None);
        assert_eq!(limiter.check_before_request(), QuotaCheck::Unknown);
    }

    #[test]
    fn test_check_thresholds() {
        let mut limiter = RateLimiter::new(10, 5);

        limiter.observe(QuotaSnapshot::new(50));
        assert_eq!(limiter.check_before_request(), QuotaCheck::Ok { remaining: 50 });

        limiter.observe(QuotaSnapshot::new(10));
        assert_eq!(limiter.check_before_request(), QuotaCheck::Ok { remaining: 10 });

        limiter.observe(QuotaSnapshot::new(9));
        assert_eq!(limiter.check_before_request(), QuotaCheck::Low { remaining: 9 });

        limiter.observe(QuotaSnapshot::new(5));
        assert_eq!(limiter.check_before_request(), QuotaCheck::Low { remaining: 5 });

        limiter.observe(QuotaSnapshot::new(4));
        assert_eq!(limiter.check_before_request(), QuotaCheck::Critical { remaining: 4 });
    }

    #[test]
    fn test_empty_snapshot_keeps_budget() {
        let mut limiter = RateLimiter::new(10, 5);
        limiter.observe(QuotaSnapshot::new(42));
        limiter.observe(QuotaSnapshot::default());
        assert_eq!(limiter.remaining(), Some(42));
    }

    #[test]
    fn test_observe_reset_time() {
        let mut limiter = RateLimiter::new(10, 5);
        let reset_at = Utc::now();
        limiter.observe(QuotaSnapshot {
            remaining: Some(7),
            reset_at: Some(reset_at),
        });
        assert_eq!(limiter.reset_at(), Some(reset_at));
    }

    #[tokio::test]
    async fn test_admit_declined() {
        let mut limiter = RateLimiter::new(10, 5);
        limiter.observe(QuotaSnapshot::new(3));

        let err = limiter.admit(&NeverContinue).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::QuotaExhausted { remaining: 3 }));
        assert!(!limiter.is_confirmed());
    }

    #[tokio::test]
    async fn test_admit_asks_once() {
        let mut limiter = RateLimiter::new(10, 5);
        limiter.observe(QuotaSnapshot::new(3));
        let confirmation = CountingConfirmation {
            answer: true,
            asked: AtomicUsize::new(0),
        };

        limiter.admit(&confirmation).await.unwrap();
        limiter.observe(QuotaSnapshot::new(2));
        let check = limiter.admit(&confirmation).await.unwrap();

        assert_eq!(check, QuotaCheck::Critical { remaining: 2 });
        assert_eq!(confirmation.asked.load(Ordering::SeqCst), 1);
        assert!(limiter.is_confirmed());
    }

    #[tokio::test]
    async fn test_admit_does_not_prompt_above_critical() {
        let mut limiter = RateLimiter::new(10, 5);
        limiter.observe(QuotaSnapshot::new(8));

        let check = limiter.admit(&NeverContinue).await.unwrap();
        assert_eq!(check, QuotaCheck::Low { remaining: 8 });
        assert!(limiter.admit(&AlwaysContinue).await.is_ok());
    }
}
