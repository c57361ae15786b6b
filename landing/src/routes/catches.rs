//! Catch submission and lookup
//!
//! The submission gateway: `POST /catches` validates the payload
//! structurally, persists the record together with its relay job, and
//! returns immediately - it never waits on the ledger. Field-name mapping
//! from client variants happens exactly once, here at the boundary; every
//! downstream component sees the canonical record.

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::schemas::{CatchRecord, CatchStatus, GeoPoint, Metadata, RelayJobDoc};
use crate::db::store::RecordStore;
use crate::server::AppState;
use crate::types::LandingError;

pub const DRYING_METHODS: [&str; 3] = ["sun", "smoke", "freeze"];
pub const MAX_IMAGES: usize = 5;

/// Incoming submission body. Legacy camelCase field names from older
/// clients are accepted as aliases and normalized here, once.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatchSubmission {
    /// Client-generated id hint; the server id is canonical
    #[serde(alias = "catchId")]
    pub catch_id: Option<String>,
    #[serde(alias = "fisherId", alias = "user_id")]
    pub actor_id: Option<String>,
    #[serde(alias = "fisherName")]
    pub actor_name: Option<String>,
    pub species: Option<String>,
    pub weight: Option<f64>,
    #[serde(alias = "harvestDate")]
    pub harvest_date: Option<String>,
    #[serde(alias = "dryingMethod")]
    pub drying_method: Option<String>,
    #[serde(alias = "batchSize")]
    pub batch_size: Option<f64>,
    #[serde(alias = "shelfLife")]
    pub shelf_life: Option<i32>,
    pub price: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(alias = "imageUrls")]
    pub image_urls: Vec<String>,
}

/// One field-level validation failure
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validated submission, ready to persist
#[derive(Debug, Clone)]
pub struct ValidCatch {
    pub catch_id_hint: Option<String>,
    pub actor_id: String,
    pub actor_name: Option<String>,
    pub species: String,
    pub weight_kg: f64,
    pub harvest_date: NaiveDate,
    pub drying_method: String,
    pub batch_size: f64,
    pub shelf_life_days: i32,
    pub price: f64,
    pub location: GeoPoint,
    pub image_urls: Vec<String>,
}

fn require_range(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> f64 {
    match value {
        None => {
            errors.push(FieldError::new(field, "is required"));
            0.0
        }
        Some(v) if v < min || v > max => {
            errors.push(FieldError::new(
                field,
                format!("must be between {min} and {max}"),
            ));
            v
        }
        Some(v) => v,
    }
}

/// Structural validation. `today` is injected so the harvest-date rule is
/// deterministic under test.
pub fn validate(
    submission: &CatchSubmission,
    actor_id: &str,
    today: NaiveDate,
) -> Result<ValidCatch, Vec<FieldError>> {
    let mut errors = Vec::new();

    let species = submission.species.clone().unwrap_or_default();
    if species.trim().is_empty() {
        errors.push(FieldError::new("species", "is required"));
    } else if !species
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c == ' ')
    {
        errors.push(FieldError::new(
            "species",
            "must contain only letters and spaces",
        ));
    }

    let drying_method = submission
        .drying_method
        .clone()
        .unwrap_or_default()
        .to_lowercase();
    if !DRYING_METHODS.contains(&drying_method.as_str()) {
        errors.push(FieldError::new(
            "drying_method",
            format!("must be one of: {}", DRYING_METHODS.join(", ")),
        ));
    }

    let weight_kg = require_range(&mut errors, "weight", submission.weight, 0.01, 10_000.0);
    let batch_size = require_range(&mut errors, "batch_size", submission.batch_size, 0.01, 10_000.0);
    let price = require_range(&mut errors, "price", submission.price, 0.01, 10_000.0);

    let harvest_date = match submission.harvest_date.as_deref() {
        None => {
            errors.push(FieldError::new("harvest_date", "is required"));
            today
        }
        Some(raw) => match raw.parse::<NaiveDate>() {
            Ok(date) if date > today => {
                errors.push(FieldError::new(
                    "harvest_date",
                    "must not be in the future",
                ));
                date
            }
            Ok(date) => date,
            Err(_) => {
                errors.push(FieldError::new(
                    "harvest_date",
                    "must be a valid date (YYYY-MM-DD)",
                ));
                today
            }
        },
    };

    let shelf_life_days = match submission.shelf_life {
        None => {
            errors.push(FieldError::new("shelf_life", "is required"));
            0
        }
        Some(days) if !(1..=365).contains(&days) => {
            errors.push(FieldError::new("shelf_life", "must be between 1 and 365"));
            days
        }
        Some(days) => days,
    };

    let lat = require_range(&mut errors, "lat", submission.lat, -90.0, 90.0);
    let lng = require_range(&mut errors, "lng", submission.lng, -180.0, 180.0);

    if submission.image_urls.len() > MAX_IMAGES {
        errors.push(FieldError::new(
            "image_urls",
            format!("at most {MAX_IMAGES} images are allowed"),
        ));
    }

    let catch_id_hint = match submission.catch_id.as_deref() {
        Some(hint) if hint.trim().is_empty() || hint.len() > 255 => {
            errors.push(FieldError::new(
                "catch_id",
                "must be a non-empty string of at most 255 characters",
            ));
            None
        }
        Some(hint) => Some(hint.to_string()),
        None => None,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidCatch {
        catch_id_hint,
        actor_id: actor_id.to_string(),
        actor_name: submission.actor_name.clone(),
        species: species.trim().to_lowercase(),
        weight_kg,
        harvest_date,
        drying_method,
        batch_size,
        shelf_life_days,
        price,
        location: GeoPoint { lat, lng },
        image_urls: submission.image_urls.clone(),
    })
}

/// Outcome of a submission, one variant per HTTP answer
pub enum SubmitResult {
    Created(CatchRecord),
    Unauthenticated,
    Invalid(Vec<FieldError>),
    Conflict(String),
    Failed(LandingError),
}

/// The gateway core: validate, persist record + relay job atomically,
/// return the persisted record. Never waits on the ledger.
pub async fn submit(
    records: &dyn RecordStore,
    submission: CatchSubmission,
    actor_hint: Option<String>,
) -> SubmitResult {
    // Actor identity comes from the auth collaborator (header) or, for
    // trusted clients, the body.
    let actor_id = match submission.actor_id.clone().or(actor_hint) {
        Some(id) if !id.trim().is_empty() => id,
        _ => return SubmitResult::Unauthenticated,
    };

    let valid = match validate(&submission, &actor_id, Utc::now().date_naive()) {
        Ok(valid) => valid,
        Err(errors) => return SubmitResult::Invalid(errors),
    };

    // Server-generated id is canonical; a client hint is honored only if
    // free (the unique index is the final arbiter).
    let catch_id = valid
        .catch_id_hint
        .clone()
        .unwrap_or_else(|| format!("CATCH_{}", Uuid::new_v4()));

    let record = CatchRecord {
        _id: None,
        metadata: Metadata::default(),
        catch_id: catch_id.clone(),
        actor_id: valid.actor_id.clone(),
        actor_name: valid.actor_name.clone(),
        species: valid.species.clone(),
        weight_kg: valid.weight_kg,
        harvest_date: valid.harvest_date,
        drying_method: valid.drying_method.clone(),
        batch_size: valid.batch_size,
        shelf_life_days: valid.shelf_life_days,
        price: valid.price,
        location: valid.location,
        image_urls: valid.image_urls.clone(),
        status: CatchStatus::Pending,
        ledger_transaction_id: None,
        ledger_block_number: None,
    };
    let job = RelayJobDoc::new(record.ledger_payload());

    match records.insert_with_job(record, job).await {
        Ok(persisted) => {
            info!(catch_id = %catch_id, actor_id = %persisted.actor_id, "Catch persisted, relay enqueued");
            SubmitResult::Created(persisted)
        }
        Err(LandingError::Conflict(msg)) => {
            warn!(catch_id = %catch_id, "Submission conflict: {}", msg);
            SubmitResult::Conflict(msg)
        }
        Err(e) => SubmitResult::Failed(e),
    }
}

/// Wire view of a catch record (flat lat/lng, RFC 3339 timestamps)
#[derive(Debug, Serialize)]
pub struct CatchRecordView {
    pub catch_id: String,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub species: String,
    pub drying_method: String,
    pub batch_size: f64,
    pub weight: f64,
    pub harvest_date: String,
    pub lat: f64,
    pub lng: f64,
    pub shelf_life: i32,
    pub price: f64,
    pub image_urls: Vec<String>,
    pub status: String,
    pub ledger_transaction_id: Option<String>,
    pub ledger_block_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<&CatchRecord> for CatchRecordView {
    fn from(record: &CatchRecord) -> Self {
        Self {
            catch_id: record.catch_id.clone(),
            actor_id: record.actor_id.clone(),
            actor_name: record.actor_name.clone(),
            species: record.species.clone(),
            drying_method: record.drying_method.clone(),
            batch_size: record.batch_size,
            weight: record.weight_kg,
            harvest_date: record.harvest_date.to_string(),
            lat: record.location.lat,
            lng: record.location.lng,
            shelf_life: record.shelf_life_days,
            price: record.price,
            image_urls: record.image_urls.clone(),
            status: record.status.as_str().to_string(),
            ledger_transaction_id: record.ledger_transaction_id.clone(),
            ledger_block_number: record.ledger_block_number,
            created_at: record
                .metadata
                .created_at
                .map(|dt| dt.try_to_rfc3339_string().unwrap_or_default()),
            updated_at: record
                .metadata
                .updated_at
                .map(|dt| dt.try_to_rfc3339_string().unwrap_or_default()),
        }
    }
}

/// `POST /catches`
pub async fn handle_submit(
    state: Arc<AppState>,
    actor_header: Option<String>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let submission: CatchSubmission = match serde_json::from_slice(&body) {
        Ok(submission) => submission,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": format!("Invalid JSON body: {e}") }),
            )
        }
    };

    match submit(state.records.as_ref(), submission, actor_header).await {
        SubmitResult::Created(record) => {
            json_response(StatusCode::CREATED, &CatchRecordView::from(&record))
        }
        SubmitResult::Unauthenticated => json_response(
            StatusCode::UNAUTHORIZED,
            &serde_json::json!({ "error": "Actor identity required" }),
        ),
        SubmitResult::Invalid(errors) => json_response(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({ "errors": errors }),
        ),
        SubmitResult::Conflict(message) => json_response(
            StatusCode::CONFLICT,
            &serde_json::json!({ "error": message }),
        ),
        SubmitResult::Failed(e) => {
            warn!("Submission failed: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({ "error": "Failed to store catch" }),
            )
        }
    }
}

/// `GET /catches/{catch_id}`
pub async fn handle_get(state: Arc<AppState>, catch_id: &str) -> Response<Full<Bytes>> {
    match state.records.find_by_catch_id(catch_id).await {
        Ok(Some(record)) => json_response(StatusCode::OK, &CatchRecordView::from(&record)),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "Catch not found" }),
        ),
        Err(e) => {
            warn!(catch_id = %catch_id, "Lookup failed: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({ "error": "Failed to fetch catch" }),
            )
        }
    }
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .expect("static response parts are valid")
}
