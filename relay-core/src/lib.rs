//! Relay core - retry policy and job state machine for ledger submission
//!
//! Pure decision logic shared by the submission gateway, the relay worker,
//! and the field client. No I/O happens here: callers feed in attempt counts
//! and error classes, and get back scheduling decisions.
//!
//! The relay guarantees at-least-once delivery to the ledger with an
//! exactly-once effect. The pieces that make that true live in this crate:
//!
//! - [`ErrorClass`] - how a ledger failure is classified (retry or not)
//! - [`JobState`] - the relay job lifecycle
//! - [`RetryPolicy`] - the fixed backoff ladder and attempt budget
//! - [`LedgerReceipt`] - the immutable proof of a committed transaction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// =============================================================================
// Error classification
// =============================================================================

/// Classification of a ledger-side failure.
///
/// Determines whether the relay worker retries, gives up, or treats the
/// outcome as a success. Classification is structural (HTTP status codes and
/// the bridge's `status` field), never substring matching on error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network timeout, unreachable peer, ledger congestion. Retried.
    Transient,
    /// Policy rejection or malformed arguments. Never retried.
    Permanent,
    /// The ledger already holds this transaction. Treated as success.
    AlreadyExists,
}

impl ErrorClass {
    /// Classify a ledger bridge HTTP response.
    ///
    /// `body_status` is the `status` field of the bridge's JSON body, when
    /// one could be parsed. A 409 or an explicit `"exists"` status is the
    /// duplicate-suppression signal; other 4xx responses are permanent
    /// rejections; everything else (5xx, unparseable) is worth retrying.
    pub fn from_response(http_status: u16, body_status: Option<&str>) -> Self {
        if http_status == 409 || body_status == Some("exists") {
            return ErrorClass::AlreadyExists;
        }
        match http_status {
            400..=499 => ErrorClass::Permanent,
            _ => ErrorClass::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
            ErrorClass::AlreadyExists => write!(f, "already_exists"),
        }
    }
}

// =============================================================================
// Job lifecycle
// =============================================================================

/// State of a relay job.
///
/// Wire representation matches the persisted queue layout:
/// `queued | in-flight | succeeded | exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// Waiting for its `next_attempt_at` to come due.
    #[default]
    Queued,
    /// Claimed by a worker; at most one in-flight job per catch id.
    InFlight,
    /// The ledger holds the transaction; terminal.
    Succeeded,
    /// Retry budget consumed or permanent rejection; terminal, needs an
    /// operator.
    Exhausted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Exhausted)
    }

    /// Persisted string form, usable in store filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::InFlight => "in-flight",
            JobState::Succeeded => "succeeded",
            JobState::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobState::Queued),
            "in-flight" => Some(JobState::InFlight),
            "succeeded" => Some(JobState::Succeeded),
            "exhausted" => Some(JobState::Exhausted),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ledger receipt
// =============================================================================

/// Proof of a committed ledger transaction.
///
/// Owned by the catch record it confirms; immutable once written. A receipt
/// already present on a record is never replaced by a later relay for the
/// same catch id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction_id: String,
    pub block_number: i64,
}

impl LedgerReceipt {
    pub fn new(transaction_id: impl Into<String>, block_number: i64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            block_number,
        }
    }

    /// Placeholder receipt for a catch confirmed present on the ledger when
    /// the original transaction id was lost (crash between submit and
    /// receipt write-back). Only ever written where no receipt exists.
    pub fn placeholder(catch_id: &str) -> Self {
        Self {
            transaction_id: format!("hash_{catch_id}"),
            block_number: 0,
        }
    }
}

// =============================================================================
// Retry policy
// =============================================================================

/// What the worker should do after an attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Release the job back to the queue, due again after `delay`.
    Retry { delay: Duration },
    /// Terminal failure: mark the job exhausted, surface to operators.
    Exhaust,
    /// The failure was `AlreadyExists`: the ledger effect is in place.
    Succeed,
}

/// Fixed retry policy for ledger submission.
///
/// Five attempts, backoff ladder of 10s / 30s / 60s / 120s / 300s indexed by
/// attempt number. Retries are never immediate; within one catch id,
/// attempts are strictly sequential and backoff-delayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    ladder: Vec<Duration>,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ladder: [10, 30, 60, 120, 300]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    pub fn new(ladder: Vec<Duration>, max_attempts: u32) -> Self {
        assert!(!ladder.is_empty(), "backoff ladder must not be empty");
        assert!(max_attempts > 0, "attempt budget must be positive");
        Self {
            ladder,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff delay after the given (1-based) failed attempt. Attempts past
    /// the end of the ladder stay on the last rung.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) as usize - 1).min(self.ladder.len() - 1);
        self.ladder[idx]
    }

    /// The single decision point for the relay worker: given how many
    /// attempts have run (including the one that just failed) and the error
    /// class, decide what happens to the job.
    pub fn decide(&self, attempt_count: u32, class: ErrorClass) -> RetryDecision {
        match class {
            ErrorClass::AlreadyExists => RetryDecision::Succeed,
            ErrorClass::Permanent => RetryDecision::Exhaust,
            ErrorClass::Transient => {
                if attempt_count >= self.max_attempts {
                    RetryDecision::Exhaust
                } else {
                    RetryDecision::Retry {
                        delay: self.delay_for(attempt_count),
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(30));
        assert_eq!(policy.delay_for(3), Duration::from_secs(60));
        assert_eq!(policy.delay_for(4), Duration::from_secs(120));
        assert_eq!(policy.delay_for(5), Duration::from_secs(300));
        // Past the ladder, stay on the last rung
        assert_eq!(policy.delay_for(9), Duration::from_secs(300));
    }

    #[test]
    fn ladder_strictly_increases() {
        let policy = RetryPolicy::default();
        for attempt in 1..5 {
            assert!(policy.delay_for(attempt + 1) > policy.delay_for(attempt));
        }
    }

    #[test]
    fn transient_retries_until_budget() {
        let policy = RetryPolicy::default();
        for attempt in 1..5 {
            match policy.decide(attempt, ErrorClass::Transient) {
                RetryDecision::Retry { delay } => {
                    assert_eq!(delay, policy.delay_for(attempt));
                }
                other => panic!("attempt {attempt}: expected retry, got {other:?}"),
            }
        }
    }

    #[test]
    fn exhausts_after_exactly_five_attempts() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.decide(4, ErrorClass::Transient),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(5, ErrorClass::Transient), RetryDecision::Exhaust);
        assert_eq!(policy.decide(6, ErrorClass::Transient), RetryDecision::Exhaust);
    }

    #[test]
    fn permanent_exhausts_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1, ErrorClass::Permanent), RetryDecision::Exhaust);
    }

    #[test]
    fn already_exists_is_success() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, ErrorClass::AlreadyExists),
            RetryDecision::Succeed
        );
        // Even on the last attempt
        assert_eq!(
            policy.decide(5, ErrorClass::AlreadyExists),
            RetryDecision::Succeed
        );
    }

    #[test]
    fn classification_from_response() {
        assert_eq!(
            ErrorClass::from_response(409, None),
            ErrorClass::AlreadyExists
        );
        assert_eq!(
            ErrorClass::from_response(200, Some("exists")),
            ErrorClass::AlreadyExists
        );
        assert_eq!(ErrorClass::from_response(400, None), ErrorClass::Permanent);
        assert_eq!(
            ErrorClass::from_response(422, Some("error")),
            ErrorClass::Permanent
        );
        assert_eq!(ErrorClass::from_response(500, None), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_response(503, None), ErrorClass::Transient);
    }

    #[test]
    fn job_state_round_trips() {
        for state in [
            JobState::Queued,
            JobState::InFlight,
            JobState::Succeeded,
            JobState::Exhausted,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            let back: JobState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, state);
        }
        assert_eq!(JobState::parse("unknown"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::InFlight.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Exhausted.is_terminal());
    }

    #[test]
    fn placeholder_receipt_is_stable() {
        let receipt = LedgerReceipt::placeholder("CATCH_1");
        assert_eq!(receipt.transaction_id, "hash_CATCH_1");
        assert_eq!(receipt.block_number, 0);
    }
}
