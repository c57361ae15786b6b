//! Ledger service adapter
//!
//! Narrow client abstraction over the external distributed-ledger network.
//! The ledger is reached through a REST bridge; this module exposes exactly
//! the three idempotent operations the relay handshake needs and classifies
//! every failure so the worker can decide whether to retry.

pub mod client;

pub use client::{HttpLedgerClient, LedgerConfig};

use async_trait::async_trait;
use chrono::NaiveDate;
use relay_core::{ErrorClass, LedgerReceipt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot of the catch fields needed for the ledger call.
///
/// Captured once, at enqueue time, so a relay job stays submittable even if
/// the primary-store record is later mutated by collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchPayload {
    pub catch_id: String,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub species: String,
    pub weight_kg: f64,
    pub harvest_date: NaiveDate,
    pub drying_method: String,
    pub batch_size: f64,
    pub shelf_life_days: i32,
    pub price: f64,
    pub lat: f64,
    pub lng: f64,
}

/// Outcome of a catch submission against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The transaction committed; the receipt is the proof.
    Committed(LedgerReceipt),
    /// The ledger already holds a transaction for this catch id. The
    /// existing receipt (if any) on the record is kept.
    AlreadyExists,
}

/// A classified ledger failure.
#[derive(Error, Debug, Clone)]
#[error("{class} ledger error: {message}")]
pub struct LedgerError {
    pub class: ErrorClass,
    pub message: String,
}

impl LedgerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            message: message.into(),
        }
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// The three idempotent operations the relay handshake performs.
///
/// Implementations hold no state beyond a connection handle and are
/// constructed explicitly from configuration - no ambient globals.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Whether a transaction for this catch already landed on the ledger.
    /// Used to short-circuit retries after a crash mid-submission.
    async fn exists(&self, actor_id: &str, catch_id: &str) -> LedgerResult<bool>;

    /// Register the submitting actor if not already known. An
    /// already-registered actor is success, not an error.
    async fn ensure_actor(&self, actor_id: &str, name: &str) -> LedgerResult<()>;

    /// Submit the catch. Duplicate submission surfaces as
    /// [`SubmitOutcome::AlreadyExists`], never as an error.
    async fn submit_catch(&self, payload: &CatchPayload) -> LedgerResult<SubmitOutcome>;
}
