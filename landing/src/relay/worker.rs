//! Relay worker
//!
//! A worker loop claims due jobs from the relay queue and runs the ledger
//! handshake for each:
//!
//! 1. existence check - short-circuits to success if the catch already
//!    landed (guards against re-submission after a crash between submit
//!    and receipt write-back)
//! 2. actor registration - an already-registered actor is success; any
//!    failure here is treated as transient
//! 3. catch submission - commit and duplicate both succeed; permanent
//!    rejections exhaust the job immediately; transient failures are
//!    rescheduled on the backoff ladder until the attempt budget runs out
//!
//! Any number of workers may run against the shared queue; the atomic claim
//! keeps attempts for one catch id strictly sequential.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::schemas::RelayJobDoc;
use crate::db::store::RecordStore;
use crate::ledger::{LedgerService, SubmitOutcome};
use crate::relay::queue::JobStore;
use crate::types::{LandingError, Result};
use relay_core::{ErrorClass, LedgerReceipt, RetryDecision, RetryPolicy};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Unique worker ID
    pub worker_id: String,
    /// Sleep between polls when the queue has nothing due
    pub poll_interval: Duration,
    /// In-flight claims older than this are considered abandoned
    pub claim_lease: Duration,
    /// Retry/backoff policy
    pub policy: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            worker_id: Uuid::new_v4().to_string(),
            poll_interval: Duration::from_secs(1),
            claim_lease: Duration::from_secs(120),
            policy: RetryPolicy::default(),
        }
    }
}

/// Result of one handshake run
enum Outcome {
    /// The ledger holds the transaction. `Some` carries a receipt to write
    /// back (write-once - an existing receipt on the record is kept);
    /// `None` means the record keeps whatever receipt it already has.
    Succeeded(Option<LedgerReceipt>),
    Failed(ErrorClass, String),
}

/// Background worker relaying persisted catch records to the ledger
pub struct RelayWorker {
    jobs: Arc<dyn JobStore>,
    records: Arc<dyn RecordStore>,
    ledger: Arc<dyn LedgerService>,
    config: RelayConfig,
    running: Arc<RwLock<bool>>,
}

impl RelayWorker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        records: Arc<dyn RecordStore>,
        ledger: Arc<dyn LedgerService>,
        config: RelayConfig,
    ) -> Self {
        Self {
            jobs,
            records,
            ledger,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run the worker loop until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        *self.running.write().await = true;
        info!(worker = %self.config.worker_id, "Relay worker started");

        while *self.running.read().await {
            match self.tick().await {
                // Processed a job; immediately look for more work
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(worker = %self.config.worker_id, "Relay tick failed: {}", e);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        info!(worker = %self.config.worker_id, "Relay worker stopped");
    }

    /// Stop the worker loop
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Claim and process at most one due job. Returns whether a job was
    /// processed.
    pub async fn tick(&self) -> Result<bool> {
        match self.jobs.claim_due(self.config.claim_lease).await? {
            Some(job) => {
                self.process(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Process one claimed job through the handshake and settle the result.
    pub async fn process(&self, job: RelayJobDoc) -> Result<()> {
        let catch_id = job.catch_id.clone();
        let attempt = job.attempt_count.max(1) as u32;

        debug!(
            worker = %self.config.worker_id,
            catch_id = %catch_id,
            attempt = attempt,
            "Processing relay job"
        );

        match self.handshake(&job).await {
            Outcome::Succeeded(receipt) => {
                if let Some(receipt) = receipt {
                    match self.records.write_receipt(&catch_id, &receipt).await {
                        Ok(true) => {
                            debug!(catch_id = %catch_id, txn = %receipt.transaction_id, "Receipt written")
                        }
                        Ok(false) => {
                            debug!(catch_id = %catch_id, "Existing receipt kept")
                        }
                        Err(LandingError::NotFound(_)) => {
                            warn!(catch_id = %catch_id, "Record missing, receipt dropped")
                        }
                        Err(e) => return Err(e),
                    }
                }
                self.jobs.mark_succeeded(&catch_id).await?;
                info!(catch_id = %catch_id, attempt = attempt, "Catch relayed to ledger");
            }
            Outcome::Failed(class, message) => {
                match self.config.policy.decide(attempt, class) {
                    RetryDecision::Retry { delay } => {
                        warn!(
                            catch_id = %catch_id,
                            attempt = attempt,
                            retry_in_secs = delay.as_secs(),
                            "Relay attempt failed: {}", message
                        );
                        self.jobs.reschedule(&catch_id, delay, &message).await?;
                    }
                    RetryDecision::Exhaust => {
                        error!(
                            catch_id = %catch_id,
                            attempt = attempt,
                            "Relay exhausted, operator attention needed: {}", message
                        );
                        self.jobs.mark_exhausted(&catch_id, &message).await?;
                    }
                    RetryDecision::Succeed => {
                        self.jobs.mark_succeeded(&catch_id).await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn handshake(&self, job: &RelayJobDoc) -> Outcome {
        // Step 1: short-circuit if the catch already landed. Covers the
        // crash window between a successful submit and the receipt write.
        match self.ledger.exists(&job.actor_id, &job.catch_id).await {
            Ok(true) => {
                debug!(catch_id = %job.catch_id, "Catch already on ledger, skipping submission");
                return Outcome::Succeeded(Some(LedgerReceipt::placeholder(&job.catch_id)));
            }
            Ok(false) => {}
            Err(e) => return Outcome::Failed(e.class, e.message),
        }

        // Step 2: actor registration. Failures here never exhaust the job -
        // registration is retried together with the submission.
        let actor_name = job.payload.actor_name.as_deref().unwrap_or("Unknown");
        if let Err(e) = self.ledger.ensure_actor(&job.actor_id, actor_name).await {
            return Outcome::Failed(ErrorClass::Transient, e.message);
        }

        // Step 3: the core write.
        match self.ledger.submit_catch(&job.payload).await {
            Ok(SubmitOutcome::Committed(receipt)) => Outcome::Succeeded(Some(receipt)),
            Ok(SubmitOutcome::AlreadyExists) => Outcome::Succeeded(None),
            Err(e) => Outcome::Failed(e.class, e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{CatchRecord, GeoPoint, Metadata};
    use crate::db::store::MemoryStore;
    use crate::ledger::{CatchPayload, LedgerError, LedgerResult};
    use chrono::NaiveDate;
    use relay_core::JobState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable ledger double
    #[derive(Default)]
    struct MockLedger {
        exists_on_ledger: std::sync::atomic::AtomicBool,
        submit_error: std::sync::Mutex<Option<LedgerError>>,
        submit_duplicate: std::sync::atomic::AtomicBool,
        ensure_error: std::sync::Mutex<Option<LedgerError>>,
        exists_calls: AtomicUsize,
        ensure_calls: AtomicUsize,
        submit_calls: AtomicUsize,
    }

    impl MockLedger {
        fn failing_submit(error: LedgerError) -> Self {
            let mock = Self::default();
            *mock.submit_error.lock().unwrap() = Some(error);
            mock
        }
    }

    #[async_trait::async_trait]
    impl LedgerService for MockLedger {
        async fn exists(&self, _actor_id: &str, _catch_id: &str) -> LedgerResult<bool> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.exists_on_ledger.load(Ordering::SeqCst))
        }

        async fn ensure_actor(&self, _actor_id: &str, _name: &str) -> LedgerResult<()> {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            match self.ensure_error.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        async fn submit_catch(&self, payload: &CatchPayload) -> LedgerResult<SubmitOutcome> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.submit_error.lock().unwrap().clone() {
                return Err(e);
            }
            if self.submit_duplicate.load(Ordering::SeqCst) {
                return Ok(SubmitOutcome::AlreadyExists);
            }
            Ok(SubmitOutcome::Committed(LedgerReceipt::new(
                format!("txn-{}", payload.catch_id),
                7,
            )))
        }
    }

    fn sample_record(catch_id: &str) -> CatchRecord {
        CatchRecord {
            _id: None,
            metadata: Metadata::default(),
            catch_id: catch_id.to_string(),
            actor_id: "fisher-1".to_string(),
            actor_name: Some("Asha".to_string()),
            species: "tilapia".to_string(),
            weight_kg: 12.5,
            harvest_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            drying_method: "sun".to_string(),
            batch_size: 3.0,
            shelf_life_days: 30,
            price: 450.0,
            location: GeoPoint { lat: -6.8, lng: 39.2 },
            image_urls: vec![],
            status: Default::default(),
            ledger_transaction_id: None,
            ledger_block_number: None,
        }
    }

    fn instant_retry_config() -> RelayConfig {
        RelayConfig {
            // Zero-delay ladder so retries come due immediately under tick()
            policy: RetryPolicy::new(vec![Duration::ZERO; 5], 5),
            claim_lease: Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn worker_with(
        store: Arc<MemoryStore>,
        ledger: Arc<MockLedger>,
        config: RelayConfig,
    ) -> RelayWorker {
        RelayWorker::new(store.clone(), store, ledger, config)
    }

    async fn enqueue_catch(store: &MemoryStore, catch_id: &str) {
        let record = sample_record(catch_id);
        let job = RelayJobDoc::new(record.ledger_payload());
        store.insert_with_job(record, job).await.unwrap();
    }

    #[tokio::test]
    async fn successful_relay_writes_receipt() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());
        let worker = worker_with(store.clone(), ledger.clone(), RelayConfig::default());

        enqueue_catch(&store, "C1").await;
        assert!(worker.tick().await.unwrap());

        let record = store.find_by_catch_id("C1").await.unwrap().unwrap();
        assert_eq!(record.ledger_transaction_id.as_deref(), Some("txn-C1"));
        assert_eq!(record.ledger_block_number, Some(7));

        assert_eq!(ledger.exists_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.ensure_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.submit_calls.load(Ordering::SeqCst), 1);

        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempt_count, 1);

        // Nothing more to do
        assert!(!worker.tick().await.unwrap());
    }

    #[tokio::test]
    async fn exists_short_circuits_without_resubmitting() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());
        ledger.exists_on_ledger.store(true, Ordering::SeqCst);
        let worker = worker_with(store.clone(), ledger.clone(), RelayConfig::default());

        enqueue_catch(&store, "C1").await;
        assert!(worker.tick().await.unwrap());

        // The core write never ran - exactly one ledger transaction exists
        assert_eq!(ledger.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.ensure_calls.load(Ordering::SeqCst), 0);

        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);

        // Placeholder receipt recorded since the original was lost
        let record = store.find_by_catch_id("C1").await.unwrap().unwrap();
        assert_eq!(record.ledger_transaction_id.as_deref(), Some("hash_C1"));
    }

    #[tokio::test]
    async fn exists_short_circuit_keeps_prior_receipt() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());
        ledger.exists_on_ledger.store(true, Ordering::SeqCst);
        let worker = worker_with(store.clone(), ledger.clone(), RelayConfig::default());

        enqueue_catch(&store, "C1").await;
        store
            .write_receipt("C1", &LedgerReceipt::new("txn-original", 3))
            .await
            .unwrap();

        assert!(worker.tick().await.unwrap());

        let record = store.find_by_catch_id("C1").await.unwrap().unwrap();
        assert_eq!(record.ledger_transaction_id.as_deref(), Some("txn-original"));
        assert_eq!(record.ledger_block_number, Some(3));
    }

    #[tokio::test]
    async fn duplicate_submission_succeeds_without_receipt_change() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());
        ledger.submit_duplicate.store(true, Ordering::SeqCst);
        let worker = worker_with(store.clone(), ledger.clone(), RelayConfig::default());

        enqueue_catch(&store, "C1").await;
        assert!(worker.tick().await.unwrap());

        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);

        // AlreadyExists carries no receipt; the record keeps what it has
        let record = store.find_by_catch_id("C1").await.unwrap().unwrap();
        assert!(record.ledger_transaction_id.is_none());
    }

    #[tokio::test]
    async fn transient_failures_exhaust_after_five_attempts() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::failing_submit(LedgerError::transient(
            "peer unreachable",
        )));
        let worker = worker_with(store.clone(), ledger.clone(), instant_retry_config());

        enqueue_catch(&store, "C2").await;

        // Drain until nothing is due anymore
        while worker.tick().await.unwrap() {}

        let job = store.find_job("C2").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Exhausted);
        assert_eq!(job.attempt_count, 5);
        assert_eq!(job.last_error.as_deref(), Some("peer unreachable"));
        assert_eq!(ledger.submit_calls.load(Ordering::SeqCst), 5);

        // The record still has null ledger fields and stays pending
        let record = store.find_by_catch_id("C2").await.unwrap().unwrap();
        assert!(record.ledger_transaction_id.is_none());
        assert!(record.ledger_block_number.is_none());
        assert_eq!(record.status, crate::db::schemas::CatchStatus::Pending);
    }

    #[tokio::test]
    async fn first_retry_lands_on_first_backoff_rung() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::failing_submit(LedgerError::transient("timeout")));
        let worker = worker_with(store.clone(), ledger, RelayConfig::default());

        enqueue_catch(&store, "C1").await;
        let before = bson::DateTime::now().timestamp_millis();
        assert!(worker.tick().await.unwrap());

        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Queued);
        let delay_ms = job.next_attempt_at.timestamp_millis() - before;
        assert!(
            (9_000..12_000).contains(&delay_ms),
            "expected ~10s backoff, got {delay_ms}ms"
        );

        // Not due again until the backoff elapses
        assert!(!worker.tick().await.unwrap());
    }

    #[tokio::test]
    async fn permanent_rejection_exhausts_immediately() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::failing_submit(LedgerError::permanent(
            "malformed chaincode arguments",
        )));
        let worker = worker_with(store.clone(), ledger.clone(), RelayConfig::default());

        enqueue_catch(&store, "C1").await;
        assert!(worker.tick().await.unwrap());

        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Exhausted);
        assert_eq!(job.attempt_count, 1);
        assert_eq!(ledger.submit_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn actor_registration_failure_is_always_retryable() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());
        // Even a permanently-classified registration failure must not
        // exhaust the job
        *ledger.ensure_error.lock().unwrap() =
            Some(LedgerError::permanent("registration rejected"));
        let worker = worker_with(store.clone(), ledger.clone(), RelayConfig::default());

        enqueue_catch(&store, "C1").await;
        assert!(worker.tick().await.unwrap());

        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(ledger.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn racing_workers_process_a_job_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());
        let worker_a = worker_with(store.clone(), ledger.clone(), RelayConfig::default());
        let worker_b = worker_with(store.clone(), ledger.clone(), RelayConfig::default());

        enqueue_catch(&store, "C1").await;

        let (a, b) = tokio::join!(worker_a.tick(), worker_b.tick());
        let processed = [a.unwrap(), b.unwrap()];
        assert_eq!(processed.iter().filter(|p| **p).count(), 1);
        assert_eq!(ledger.submit_calls.load(Ordering::SeqCst), 1);

        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempt_count, 1);
    }

    #[tokio::test]
    async fn crash_between_submit_and_receipt_does_not_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MockLedger::default());

        enqueue_catch(&store, "C1").await;

        // First worker claims, submits... and dies before settling.
        let claimed = store
            .claim_due(Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        let _ = ledger.submit_catch(&claimed.payload).await.unwrap();
        ledger.exists_on_ledger.store(true, Ordering::SeqCst);

        // Lease expires; a fresh worker reclaims the job.
        let worker = worker_with(
            store.clone(),
            ledger.clone(),
            RelayConfig {
                claim_lease: Duration::ZERO,
                ..Default::default()
            },
        );
        assert!(worker.tick().await.unwrap());

        // Exactly one ledger submission happened across both lives
        assert_eq!(ledger.submit_calls.load(Ordering::SeqCst), 1);
        let job = store.find_job("C1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempt_count, 2);
    }
}
