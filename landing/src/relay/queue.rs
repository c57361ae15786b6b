//! Relay queue port
//!
//! The queue is the only coordination point between gateway and workers.
//! Claiming is the single locking primitive in the system: the atomic
//! `queued -> in-flight` transition guarantees at most one worker processes
//! a given catch id at a time. A claim also covers crash recovery - an
//! in-flight job whose claim is older than the lease was abandoned by a
//! dead worker and becomes claimable again.

use async_trait::async_trait;
use std::time::Duration;

use crate::db::schemas::RelayJobDoc;
use crate::types::Result;
use relay_core::JobState;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a queued job. Fails with a conflict if one already exists for
    /// the catch id.
    async fn enqueue(&self, job: RelayJobDoc) -> Result<()>;

    /// Atomically claim the next due job: `queued` with `next_attempt_at`
    /// in the past, or `in-flight` with a claim older than `lease`.
    /// The claim marks the job in-flight, stamps `claimed_at`, and
    /// increments `attempt_count`. Returns the job as claimed.
    async fn claim_due(&self, lease: Duration) -> Result<Option<RelayJobDoc>>;

    /// Release a claimed job back to the queue, due again after `delay`.
    async fn reschedule(&self, catch_id: &str, delay: Duration, error: &str) -> Result<()>;

    /// Terminal success: the ledger holds the transaction.
    async fn mark_succeeded(&self, catch_id: &str) -> Result<()>;

    /// Terminal failure: retry budget consumed or permanent rejection.
    async fn mark_exhausted(&self, catch_id: &str, error: &str) -> Result<()>;

    async fn find_job(&self, catch_id: &str) -> Result<Option<RelayJobDoc>>;

    async fn list_by_state(&self, state: JobState) -> Result<Vec<RelayJobDoc>>;

    /// Jobs still awaiting a ledger outcome (queued + in-flight).
    async fn queue_depth(&self) -> Result<u64>;
}
