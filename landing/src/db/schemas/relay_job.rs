//! Relay job schema
//!
//! One pending or in-flight attempt to write a catch record to the ledger.
//! Keyed by `catch_id` (the idempotency key); at most one job exists per
//! catch, and at most one worker holds it in-flight at a time.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::ledger::CatchPayload;
use relay_core::JobState;

/// Collection name for relay jobs
pub const RELAY_JOB_COLLECTION: &str = "relay_jobs";

/// Relay job stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RelayJobDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Idempotency key; unique per job
    pub catch_id: String,

    pub actor_id: String,

    /// Snapshot of the fields needed for the ledger call
    pub payload: CatchPayload,

    /// Attempts started so far (incremented when a worker claims the job)
    #[serde(default)]
    pub attempt_count: i32,

    #[serde(default)]
    pub state: JobState,

    /// When the job is next due
    pub next_attempt_at: DateTime,

    /// Set while in-flight; a claim older than the lease is reclaimable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime>,

    /// Last failure, kept for operator visibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RelayJobDoc {
    /// Create a queued job due immediately
    pub fn new(payload: CatchPayload) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            catch_id: payload.catch_id.clone(),
            actor_id: payload.actor_id.clone(),
            payload,
            attempt_count: 0,
            state: JobState::Queued,
            next_attempt_at: DateTime::now(),
            claimed_at: None,
            last_error: None,
        }
    }
}

impl IntoIndexes for RelayJobDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One job per catch
            (
                doc! { "catch_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("catch_id_unique".to_string())
                        .build(),
                ),
            ),
            // The claim scan: due queued jobs, oldest first
            (
                doc! { "state": 1, "next_attempt_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("state_due_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for RelayJobDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
