//! End-to-end gateway + relay scenarios against the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use landing::db::store::{MemoryStore, RecordStore};
use landing::db::schemas::CatchStatus;
use landing::ledger::{CatchPayload, LedgerError, LedgerResult, LedgerService, SubmitOutcome};
use landing::relay::queue::JobStore;
use landing::relay::{RelayConfig, RelayWorker};
use landing::routes::catches::{submit, CatchSubmission, SubmitResult};
use relay_core::{JobState, LedgerReceipt, RetryPolicy};

/// Ledger double: either commits every submission or fails transiently.
struct ScriptedLedger {
    transient_failures: bool,
    committed: AtomicUsize,
}

impl ScriptedLedger {
    fn healthy() -> Self {
        Self {
            transient_failures: false,
            committed: AtomicUsize::new(0),
        }
    }

    fn unreachable() -> Self {
        Self {
            transient_failures: true,
            committed: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl LedgerService for ScriptedLedger {
    async fn exists(&self, _actor_id: &str, _catch_id: &str) -> LedgerResult<bool> {
        if self.transient_failures {
            return Err(LedgerError::transient("ledger peer unreachable"));
        }
        Ok(false)
    }

    async fn ensure_actor(&self, _actor_id: &str, _name: &str) -> LedgerResult<()> {
        Ok(())
    }

    async fn submit_catch(&self, payload: &CatchPayload) -> LedgerResult<SubmitOutcome> {
        if self.transient_failures {
            return Err(LedgerError::transient("ledger peer unreachable"));
        }
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitOutcome::Committed(LedgerReceipt::new(
            format!("txn-{}", payload.catch_id),
            11,
        )))
    }
}

fn submission(catch_id: Option<&str>) -> CatchSubmission {
    serde_json::from_value(serde_json::json!({
        "catch_id": catch_id,
        "actor_id": "fisher-1",
        "actor_name": "Asha",
        "species": "tilapia",
        "weight": 12.5,
        "harvest_date": "2026-08-01",
        "drying_method": "sun",
        "batch_size": 3.0,
        "shelf_life": 30,
        "price": 450.0,
        "lat": -6.8,
        "lng": 39.2,
    }))
    .unwrap()
}

fn worker(
    store: &Arc<MemoryStore>,
    ledger: Arc<ScriptedLedger>,
    policy: RetryPolicy,
) -> RelayWorker {
    RelayWorker::new(
        store.clone(),
        store.clone(),
        ledger,
        RelayConfig {
            policy,
            ..Default::default()
        },
    )
}

/// Capture -> gateway -> relay -> receipt. Exactly one ledger transaction
/// exists at the end and the record carries its id.
#[tokio::test]
async fn submitted_catch_reaches_the_ledger_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(ScriptedLedger::healthy());

    let record = match submit(store.as_ref(), submission(Some("C1")), None).await {
        SubmitResult::Created(record) => record,
        _ => panic!("expected created"),
    };
    assert_eq!(record.catch_id, "C1");
    assert_eq!(record.status, CatchStatus::Pending);
    assert!(record.ledger_transaction_id.is_none());

    let worker = worker(&store, ledger.clone(), RetryPolicy::default());
    while worker.tick().await.unwrap() {}

    let record = store.find_by_catch_id("C1").await.unwrap().unwrap();
    assert_eq!(record.ledger_transaction_id.as_deref(), Some("txn-C1"));
    assert_eq!(record.ledger_block_number, Some(11));
    assert_eq!(ledger.committed.load(Ordering::SeqCst), 1);

    let job = store.find_job("C1").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Succeeded);
}

/// An unreachable ledger exhausts the job after five attempts while the
/// record stays pending with null ledger fields.
#[tokio::test]
async fn unreachable_ledger_exhausts_without_losing_the_record() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(ScriptedLedger::unreachable());

    match submit(store.as_ref(), submission(Some("C2")), None).await {
        SubmitResult::Created(_) => {}
        _ => panic!("expected created"),
    }

    // Zero-delay ladder so every retry is immediately due
    let policy = RetryPolicy::new(vec![Duration::ZERO; 5], 5);
    let worker = worker(&store, ledger, policy);
    while worker.tick().await.unwrap() {}

    let job = store.find_job("C2").await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Exhausted);
    assert_eq!(job.attempt_count, 5);

    let record = store.find_by_catch_id("C2").await.unwrap().unwrap();
    assert_eq!(record.status, CatchStatus::Pending);
    assert!(record.ledger_transaction_id.is_none());
    assert!(record.ledger_block_number.is_none());
}

/// Re-submitting the same catch id is rejected by the gateway and never
/// creates a second relay job.
#[tokio::test]
async fn duplicate_submission_is_a_conflict() {
    let store = Arc::new(MemoryStore::new());

    match submit(store.as_ref(), submission(Some("C3")), None).await {
        SubmitResult::Created(_) => {}
        _ => panic!("expected created"),
    }
    match submit(store.as_ref(), submission(Some("C3")), None).await {
        SubmitResult::Conflict(_) => {}
        _ => panic!("expected conflict"),
    }

    assert_eq!(store.queue_depth().await.unwrap(), 1);
}
