//! Catch record schema
//!
//! One field-captured catch event. Created by the submission gateway at
//! persistence time; the relay worker fills in the ledger receipt fields;
//! the approval workflow (an external collaborator) moves `status`. Records
//! are never deleted by this subsystem.

use bson::{doc, oid::ObjectId, Document};
use chrono::NaiveDate;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::ledger::CatchPayload;
use relay_core::LedgerReceipt;

/// Collection name for catch records
pub const CATCH_COLLECTION: &str = "catch_records";

/// Geolocation of the capture point
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Approval status of a catch record
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatchStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl CatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatchStatus::Pending => "pending",
            CatchStatus::Approved => "approved",
            CatchStatus::Rejected => "rejected",
        }
    }
}

/// Catch record stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CatchRecord {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Globally unique catch identifier; also the relay idempotency key
    pub catch_id: String,

    /// Submitting actor (fisher)
    pub actor_id: String,

    /// Actor display name, carried for ledger actor registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,

    pub species: String,
    pub weight_kg: f64,
    pub harvest_date: NaiveDate,
    pub drying_method: String,
    pub batch_size: f64,
    pub shelf_life_days: i32,
    pub price: f64,
    pub location: GeoPoint,

    /// Opaque references to already-uploaded images
    #[serde(default)]
    pub image_urls: Vec<String>,

    #[serde(default)]
    pub status: CatchStatus,

    /// Set once by the relay worker; never overwritten afterwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_transaction_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_block_number: Option<i64>,
}

impl CatchRecord {
    /// Snapshot of the fields the ledger call needs
    pub fn ledger_payload(&self) -> CatchPayload {
        CatchPayload {
            catch_id: self.catch_id.clone(),
            actor_id: self.actor_id.clone(),
            actor_name: self.actor_name.clone(),
            species: self.species.clone(),
            weight_kg: self.weight_kg,
            harvest_date: self.harvest_date,
            drying_method: self.drying_method.clone(),
            batch_size: self.batch_size,
            shelf_life_days: self.shelf_life_days,
            price: self.price,
            lat: self.location.lat,
            lng: self.location.lng,
        }
    }

    pub fn has_receipt(&self) -> bool {
        self.ledger_transaction_id.is_some()
    }

    pub fn apply_receipt(&mut self, receipt: &LedgerReceipt) {
        if self.ledger_transaction_id.is_none() {
            self.ledger_transaction_id = Some(receipt.transaction_id.clone());
            self.ledger_block_number = Some(receipt.block_number);
        }
    }
}

impl IntoIndexes for CatchRecord {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // catch_id is the idempotency key: unique across the store
            (
                doc! { "catch_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("catch_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "actor_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("actor_id_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CatchRecord {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
