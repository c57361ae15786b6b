//! Record and job stores
//!
//! `RecordStore` is the gateway's and worker's view of the primary store;
//! `JobStore` (see `relay::queue`) is the relay queue. `MongoStore` backs
//! both with MongoDB; `MemoryStore` backs both with in-process maps and is
//! used by tests and dev mode.

use async_trait::async_trait;
use bson::{doc, DateTime};
use mongodb::options::ReturnDocument;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db::mongo::{is_duplicate_key, MongoClient, MongoCollection};
use crate::db::schemas::{
    CatchRecord, Metadata, RelayJobDoc, CATCH_COLLECTION, RELAY_JOB_COLLECTION,
};
use crate::relay::queue::JobStore;
use crate::types::{LandingError, Result};
use relay_core::{JobState, LedgerReceipt};

/// The primary store operations the gateway and relay worker need.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new catch record together with its relay job. The two
    /// writes are atomic with respect to each other: a record never exists
    /// without its job, and vice versa.
    async fn insert_with_job(&self, record: CatchRecord, job: RelayJobDoc) -> Result<CatchRecord>;

    async fn find_by_catch_id(&self, catch_id: &str) -> Result<Option<CatchRecord>>;

    /// Write the ledger receipt onto the record. A receipt already present
    /// is kept - this returns `false` and writes nothing.
    async fn write_receipt(&self, catch_id: &str, receipt: &LedgerReceipt) -> Result<bool>;
}

// =============================================================================
// MongoDB implementation
// =============================================================================

pub struct MongoStore {
    client: MongoClient,
    catches: MongoCollection<CatchRecord>,
    jobs: MongoCollection<RelayJobDoc>,
}

impl MongoStore {
    pub async fn new(client: MongoClient) -> Result<Self> {
        let catches = client.collection::<CatchRecord>(CATCH_COLLECTION).await?;
        let jobs = client.collection::<RelayJobDoc>(RELAY_JOB_COLLECTION).await?;
        Ok(Self {
            client,
            catches,
            jobs,
        })
    }

    fn due_filter(lease: Duration) -> bson::Document {
        let now = DateTime::now();
        let stale = DateTime::from_millis(now.timestamp_millis() - lease.as_millis() as i64);
        doc! {
            "$or": [
                { "state": "queued", "next_attempt_at": { "$lte": now } },
                { "state": "in-flight", "claimed_at": { "$lte": stale } },
            ]
        }
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn insert_with_job(
        &self,
        mut record: CatchRecord,
        mut job: RelayJobDoc,
    ) -> Result<CatchRecord> {
        record.metadata = Metadata::new();
        job.metadata = Metadata::new();

        let mut session = self
            .client
            .inner()
            .start_session()
            .await
            .map_err(|e| LandingError::Database(format!("Failed to start session: {}", e)))?;

        session
            .start_transaction()
            .await
            .map_err(|e| LandingError::Database(format!("Failed to start transaction: {}", e)))?;

        let inserts: std::result::Result<(), mongodb::error::Error> = async {
            self.catches
                .inner()
                .insert_one(&record)
                .session(&mut session)
                .await?;
            self.jobs
                .inner()
                .insert_one(&job)
                .session(&mut session)
                .await?;
            Ok(())
        }
        .await;

        match inserts {
            Ok(()) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| LandingError::Database(format!("Commit failed: {}", e)))?;
                Ok(record)
            }
            Err(e) => {
                let _ = session.abort_transaction().await;
                if is_duplicate_key(&e) {
                    Err(LandingError::Conflict(format!(
                        "catch_id '{}' already exists",
                        record.catch_id
                    )))
                } else {
                    Err(LandingError::Database(format!("Insert failed: {}", e)))
                }
            }
        }
    }

    async fn find_by_catch_id(&self, catch_id: &str) -> Result<Option<CatchRecord>> {
        self.catches.find_one(doc! { "catch_id": catch_id }).await
    }

    async fn write_receipt(&self, catch_id: &str, receipt: &LedgerReceipt) -> Result<bool> {
        // The null filter matches missing fields too; a present receipt is
        // never overwritten.
        let result = self
            .catches
            .update_one(
                doc! { "catch_id": catch_id, "ledger_transaction_id": null },
                doc! { "$set": {
                    "ledger_transaction_id": &receipt.transaction_id,
                    "ledger_block_number": receipt.block_number,
                    "metadata.updated_at": DateTime::now(),
                }},
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}

#[async_trait]
impl JobStore for MongoStore {
    async fn enqueue(&self, mut job: RelayJobDoc) -> Result<()> {
        job.metadata = Metadata::new();
        match self.jobs.inner().insert_one(&job).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(LandingError::Conflict(
                "relay job already enqueued".to_string(),
            )),
            Err(e) => Err(LandingError::Database(format!("Insert failed: {}", e))),
        }
    }

    async fn claim_due(&self, lease: Duration) -> Result<Option<RelayJobDoc>> {
        let claimed = self
            .jobs
            .inner()
            .find_one_and_update(
                Self::due_filter(lease),
                doc! {
                    "$set": {
                        "state": "in-flight",
                        "claimed_at": DateTime::now(),
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$inc": { "attempt_count": 1 },
                },
            )
            .sort(doc! { "next_attempt_at": 1 })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| LandingError::Database(format!("Claim failed: {}", e)))?;

        if let Some(ref job) = claimed {
            debug!(catch_id = %job.catch_id, attempt = job.attempt_count, "claimed relay job");
        }
        Ok(claimed)
    }

    async fn reschedule(&self, catch_id: &str, delay: Duration, error: &str) -> Result<()> {
        let next = DateTime::from_millis(
            DateTime::now().timestamp_millis() + delay.as_millis() as i64,
        );
        self.jobs
            .update_one(
                doc! { "catch_id": catch_id },
                doc! {
                    "$set": {
                        "state": "queued",
                        "next_attempt_at": next,
                        "last_error": error,
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$unset": { "claimed_at": "" },
                },
            )
            .await?;
        Ok(())
    }

    async fn mark_succeeded(&self, catch_id: &str) -> Result<()> {
        self.jobs
            .update_one(
                doc! { "catch_id": catch_id },
                doc! {
                    "$set": {
                        "state": "succeeded",
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$unset": { "claimed_at": "", "last_error": "" },
                },
            )
            .await?;
        Ok(())
    }

    async fn mark_exhausted(&self, catch_id: &str, error: &str) -> Result<()> {
        self.jobs
            .update_one(
                doc! { "catch_id": catch_id },
                doc! {
                    "$set": {
                        "state": "exhausted",
                        "last_error": error,
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$unset": { "claimed_at": "" },
                },
            )
            .await?;
        Ok(())
    }

    async fn find_job(&self, catch_id: &str) -> Result<Option<RelayJobDoc>> {
        self.jobs.find_one(doc! { "catch_id": catch_id }).await
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<RelayJobDoc>> {
        self.jobs.find_many(doc! { "state": state.as_str() }).await
    }

    async fn queue_depth(&self) -> Result<u64> {
        self.jobs
            .count(doc! { "state": { "$in": ["queued", "in-flight"] } })
            .await
    }
}

// =============================================================================
// In-memory implementation (tests, dev mode)
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, CatchRecord>>,
    jobs: Mutex<HashMap<String, RelayJobDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_with_job(
        &self,
        mut record: CatchRecord,
        mut job: RelayJobDoc,
    ) -> Result<CatchRecord> {
        record.metadata = Metadata::new();
        job.metadata = Metadata::new();

        let mut records = self.records.lock().await;
        let mut jobs = self.jobs.lock().await;

        if records.contains_key(&record.catch_id) || jobs.contains_key(&job.catch_id) {
            return Err(LandingError::Conflict(format!(
                "catch_id '{}' already exists",
                record.catch_id
            )));
        }

        records.insert(record.catch_id.clone(), record.clone());
        jobs.insert(job.catch_id.clone(), job);
        Ok(record)
    }

    async fn find_by_catch_id(&self, catch_id: &str) -> Result<Option<CatchRecord>> {
        Ok(self.records.lock().await.get(catch_id).cloned())
    }

    async fn write_receipt(&self, catch_id: &str, receipt: &LedgerReceipt) -> Result<bool> {
        let mut records = self.records.lock().await;
        match records.get_mut(catch_id) {
            Some(record) if !record.has_receipt() => {
                record.apply_receipt(receipt);
                record.metadata.updated_at = Some(DateTime::now());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(LandingError::NotFound(format!("catch '{}'", catch_id))),
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn enqueue(&self, mut job: RelayJobDoc) -> Result<()> {
        job.metadata = Metadata::new();
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.catch_id) {
            return Err(LandingError::Conflict(
                "relay job already enqueued".to_string(),
            ));
        }
        jobs.insert(job.catch_id.clone(), job);
        Ok(())
    }

    async fn claim_due(&self, lease: Duration) -> Result<Option<RelayJobDoc>> {
        let now = DateTime::now();
        let stale_before = now.timestamp_millis() - lease.as_millis() as i64;

        let mut jobs = self.jobs.lock().await;
        let due_key = jobs
            .values()
            .filter(|job| match job.state {
                JobState::Queued => job.next_attempt_at.timestamp_millis() <= now.timestamp_millis(),
                JobState::InFlight => job
                    .claimed_at
                    .map(|c| c.timestamp_millis() <= stale_before)
                    .unwrap_or(true),
                _ => false,
            })
            .min_by_key(|job| job.next_attempt_at.timestamp_millis())
            .map(|job| job.catch_id.clone());

        Ok(due_key.map(|key| {
            let job = jobs.get_mut(&key).expect("job present under lock");
            job.state = JobState::InFlight;
            job.claimed_at = Some(now);
            job.attempt_count += 1;
            job.metadata.updated_at = Some(now);
            job.clone()
        }))
    }

    async fn reschedule(&self, catch_id: &str, delay: Duration, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(catch_id)
            .ok_or_else(|| LandingError::NotFound(format!("relay job '{}'", catch_id)))?;
        job.state = JobState::Queued;
        job.next_attempt_at = DateTime::from_millis(
            DateTime::now().timestamp_millis() + delay.as_millis() as i64,
        );
        job.claimed_at = None;
        job.last_error = Some(error.to_string());
        job.metadata.updated_at = Some(DateTime::now());
        Ok(())
    }

    async fn mark_succeeded(&self, catch_id: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(catch_id)
            .ok_or_else(|| LandingError::NotFound(format!("relay job '{}'", catch_id)))?;
        job.state = JobState::Succeeded;
        job.claimed_at = None;
        job.last_error = None;
        job.metadata.updated_at = Some(DateTime::now());
        Ok(())
    }

    async fn mark_exhausted(&self, catch_id: &str, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(catch_id)
            .ok_or_else(|| LandingError::NotFound(format!("relay job '{}'", catch_id)))?;
        job.state = JobState::Exhausted;
        job.claimed_at = None;
        job.last_error = Some(error.to_string());
        job.metadata.updated_at = Some(DateTime::now());
        Ok(())
    }

    async fn find_job(&self, catch_id: &str) -> Result<Option<RelayJobDoc>> {
        Ok(self.jobs.lock().await.get(catch_id).cloned())
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<RelayJobDoc>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.state == state)
            .cloned()
            .collect())
    }

    async fn queue_depth(&self) -> Result<u64> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| !job.state.is_terminal())
            .count() as u64)
    }
}
