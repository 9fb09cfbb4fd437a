//! Per-call retry decisions for credential provider requests
//!
//! This is the HTTP-level policy. The refresh orchestrator runs its own,
//! separate attempt loop with a flat delay on top of it.

use serde::Serialize;

use crate::status::{classify, StatusCategory};

/// Rate limits without a server hint wait this many times the base delay
const RATE_LIMIT_MULTIPLIER: u64 = 3;

/// Decision for a single failed call. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// Only meaningful when `should_retry` is true
    pub delay_seconds: u64,
    pub category: StatusCategory,
}

impl RetryDecision {
    fn stop(category: StatusCategory) -> Self {
        Self {
            should_retry: false,
            delay_seconds: 0,
            category,
        }
    }

    fn retry_after(category: StatusCategory, delay_seconds: u64) -> Self {
        Self {
            should_retry: true,
            delay_seconds,
            category,
        }
    }
}

/// Inputs for one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_seconds: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_seconds: u64) -> Self {
        Self {
            max_attempts,
            base_delay_seconds,
        }
    }

    /// Decide whether attempt `attempt_number` (1-based) should be followed by another.
    ///
    /// Server errors back off linearly with the attempt number (`base * attempt`).
    /// Rate limits honour `retry_after_hint` when present, else `base * 3`.
    pub fn decide(
        &self,
        attempt_number: u32,
        status_code: i64,
        retry_after_hint: Option<u64>,
    ) -> RetryDecision {
        let category = classify(status_code);

        if !category.is_transient() {
            return RetryDecision::stop(category);
        }

        if attempt_number >= self.max_attempts {
            return RetryDecision::stop(category);
        }

        match category {
            StatusCategory::RateLimit => {
                let delay = retry_after_hint
                    .unwrap_or(self.base_delay_seconds.saturating_mul(RATE_LIMIT_MULTIPLIER));
                RetryDecision::retry_after(category, delay)
            }
            StatusCategory::ServerError => {
                let delay = self
                    .base_delay_seconds
                    .saturating_mul(u64::from(attempt_number));
                RetryDecision::retry_after(category, delay)
            }
            _ => RetryDecision::stop(category),
        }
    }
}

/// Free-function form of [`RetryPolicy::decide`]
pub fn decide(
    max_attempts: u32,
    attempt_number: u32,
    status_code: i64,
    base_delay_seconds: u64,
    retry_after_hint: Option<u64>,
) -> RetryDecision {
    RetryPolicy::new(max_attempts, base_delay_seconds).decide(
        attempt_number,
        status_code,
        retry_after_hint,
    )
}
