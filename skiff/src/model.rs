//! Wire and queue types for the field client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catch as captured in the field, in the gateway's wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchDraft {
    /// Optional id hint; the server-assigned id is canonical
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catch_id: Option<String>,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub species: String,
    pub weight: f64,
    pub harvest_date: String,
    pub drying_method: String,
    pub batch_size: f64,
    pub shelf_life: i32,
    pub price: f64,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
}

/// The slice of the gateway's response the client needs: proof that the
/// record was persisted, and the ledger fields for later display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchRecordAck {
    #[serde(default)]
    pub catch_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ledger_transaction_id: Option<String>,
    #[serde(default)]
    pub ledger_block_number: Option<i64>,
}

/// Kind of action captured offline. Catch submission is the only kind
/// today; the tag keeps the queue format open for others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SubmitCatch,
}

/// One action captured without connectivity, waiting for sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineAction {
    /// Locally generated queue key
    pub action_id: String,
    pub kind: ActionKind,
    pub payload: CatchDraft,
    pub captured_at: DateTime<Utc>,
}
